use thiserror::Error;

/// Phase of the object-storage upload protocol that reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Apply,
    Put,
    Commit,
}

impl UploadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadPhase::Apply => "apply",
            UploadPhase::Put => "put",
            UploadPhase::Commit => "commit",
        }
    }
}

impl std::fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream-reported upload failure. Transport errors are not wrapped here;
/// they propagate as-is so the caller can retry the whole upload.
#[derive(Debug, Error)]
#[error("upload {phase} phase rejected: {message}")]
pub struct UploadError {
    pub phase: UploadPhase,
    pub message: String,
}

impl UploadError {
    pub fn new(phase: UploadPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

/// Malformed signer input. A wrong signature never surfaces here; the
/// upstream answers 4xx instead.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("signing credential is missing its {0}")]
    MissingCredential(&'static str),

    #[error("header name is not ASCII: {0:?}")]
    BadHeaderName(String),
}

/// Generation job failures. Timeouts are not errors: the poller returns a
/// partial result instead.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job submission was not accepted: {message}")]
    Submission { message: String },

    #[error("generation rejected by content policy (fail code {code})")]
    ContentRejected { code: String },

    #[error("{message}")]
    Generic { message: String },

    #[error("poll transport failed {attempts} consecutive times: {last_error}")]
    NetworkExhausted { attempts: u32, last_error: String },
}
