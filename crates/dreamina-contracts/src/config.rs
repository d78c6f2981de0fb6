use std::time::Duration;

use crate::jobs::JobStatus;

/// Session and identity constants for the main API host. Values mirror the
/// web client the service expects to be talking to.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub app_id: u64,
    pub app_version: String,
    pub web_version: String,
    pub da_version: String,
    pub aigc_features: String,
    pub request_timeout: Duration,
    /// Explicit session token; when absent the client falls back to the
    /// environment.
    pub session_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://jimeng.jianying.com".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
                .to_string(),
            app_id: 513695,
            app_version: "5.8.0".to_string(),
            web_version: "6.6.0".to_string(),
            da_version: "3.3.2".to_string(),
            aigc_features: "app_lip_sync".to_string(),
            request_timeout: Duration::from_secs(60),
            session_token: None,
        }
    }
}

/// Poll-loop tuning. Waits key off the current status; the first poll of a
/// job waits longer because the service almost never finishes instantly.
#[derive(Debug, Clone)]
pub struct PollTuning {
    pub max_polls: u32,
    pub max_transport_errors: u32,
    pub budget: Duration,
    /// Server-side batch boundary: a job asking for more than this many
    /// outputs stalls at exactly this finished count until a continuation
    /// submission arrives.
    pub batch_size: u64,
    pub first_wait: Duration,
    pub steady_wait: Duration,
    pub slow_first_wait: Duration,
    pub slow_steady_wait: Duration,
    pub queued_first_wait: Duration,
    pub queued_steady_wait: Duration,
}

impl Default for PollTuning {
    fn default() -> Self {
        Self {
            max_polls: 30,
            max_transport_errors: 3,
            budget: Duration::from_secs(300),
            batch_size: 4,
            first_wait: Duration::from_secs(5),
            steady_wait: Duration::from_secs(5),
            slow_first_wait: Duration::from_secs(15),
            slow_steady_wait: Duration::from_secs(8),
            queued_first_wait: Duration::from_secs(30),
            queued_steady_wait: Duration::from_secs(10),
        }
    }
}

impl PollTuning {
    pub fn wait_for(&self, status: JobStatus, first_poll: bool) -> Duration {
        match status {
            JobStatus::ProcessingQueued => {
                if first_poll {
                    self.queued_first_wait
                } else {
                    self.queued_steady_wait
                }
            }
            JobStatus::ProcessingSlow => {
                if first_poll {
                    self.slow_first_wait
                } else {
                    self.slow_steady_wait
                }
            }
            _ => {
                if first_poll {
                    self.first_wait
                } else {
                    self.steady_wait
                }
            }
        }
    }

    /// All waits zeroed; for tests driving scripted backends.
    pub fn immediate() -> Self {
        Self {
            first_wait: Duration::ZERO,
            steady_wait: Duration::ZERO,
            slow_first_wait: Duration::ZERO,
            slow_steady_wait: Duration::ZERO,
            queued_first_wait: Duration::ZERO,
            queued_steady_wait: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Object-storage endpoint identity for the upload protocol.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub endpoint: String,
    pub region: String,
    pub service: String,
    pub service_id: String,
    pub api_version: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://imagex.bytedanceapi.com".to_string(),
            region: "cn-north-1".to_string(),
            service: "imagex".to_string(),
            service_id: "tb4s082cfz".to_string(),
            api_version: "2018-08-01".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::PollTuning;
    use crate::jobs::JobStatus;

    #[test]
    fn waits_stretch_for_queued_and_slow_states() {
        let tuning = PollTuning::default();
        let queued = tuning.wait_for(JobStatus::ProcessingQueued, true);
        let slow = tuning.wait_for(JobStatus::ProcessingSlow, true);
        let normal = tuning.wait_for(JobStatus::Processing, true);
        assert!(queued > slow);
        assert!(slow > normal);
        assert_eq!(
            tuning.wait_for(JobStatus::Processing, false),
            tuning.steady_wait
        );
    }

    #[test]
    fn immediate_tuning_never_sleeps() {
        let tuning = PollTuning::immediate();
        for status in [
            JobStatus::Processing,
            JobStatus::ProcessingSlow,
            JobStatus::ProcessingQueued,
        ] {
            assert_eq!(tuning.wait_for(status, true), Duration::ZERO);
            assert_eq!(tuning.wait_for(status, false), Duration::ZERO);
        }
    }
}
