use serde_json::{Map, Value};

use crate::errors::JobError;

/// Server-side job state as reported by the history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Processing,
    ProcessingSlow,
    ProcessingQueued,
    Failed,
    Succeeded,
    Unknown(i64),
}

impl JobStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            20 => JobStatus::Processing,
            42 => JobStatus::ProcessingSlow,
            45 => JobStatus::ProcessingQueued,
            30 => JobStatus::Failed,
            50 => JobStatus::Succeeded,
            other => JobStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            JobStatus::Processing => 20,
            JobStatus::ProcessingSlow => 42,
            JobStatus::ProcessingQueued => 45,
            JobStatus::Failed => 30,
            JobStatus::Succeeded => 50,
            JobStatus::Unknown(other) => *other,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            JobStatus::Processing | JobStatus::ProcessingSlow | JobStatus::ProcessingQueued
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Succeeded)
    }
}

/// One fetch of a job's record. Mutated only by re-fetching; the poller keeps
/// the last observed copy for partial extraction.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub status: JobStatus,
    pub fail_code: Option<String>,
    pub finished_count: u64,
    pub total_count: u64,
    pub items: Vec<Value>,
}

impl JobRecord {
    /// Pulls this job's record out of a history payload. A payload without
    /// the record is a hard failure, not a retry case.
    pub fn from_history(payload: &Value, job_id: &str) -> Result<Self, JobError> {
        let record = payload
            .get("data")
            .and_then(|data| data.get(job_id))
            .filter(|record| !record.is_null())
            .ok_or_else(|| JobError::Generic {
                message: format!("history record for job {job_id} missing from poll response"),
            })?;
        Ok(Self {
            status: record
                .get("status")
                .and_then(Value::as_i64)
                .map_or(JobStatus::Unknown(-1), JobStatus::from_code),
            fail_code: record
                .get("fail_code")
                .and_then(Value::as_str)
                .map(str::to_string),
            finished_count: record
                .get("finished_image_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            total_count: record
                .get("total_image_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            items: record
                .get("item_list")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        })
    }
}

/// Opaque generation payload assembled by the caller. The client posts it
/// verbatim and only reads back the job id.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub body: Map<String, Value>,
}

impl JobRequest {
    pub fn new(body: Map<String, Value>) -> Self {
        Self { body }
    }

    /// The same payload re-targeted at an existing job, unlocking generation
    /// of the batch beyond the first.
    pub fn continuation_body(&self, job_id: &str) -> Map<String, Value> {
        let mut body = self.body.clone();
        body.insert("action".to_string(), Value::from(2));
        body.insert("history_id".to_string(), Value::from(job_id));
        body
    }
}

/// Tracks the one-shot follow-up submission for a job. Once flipped, the
/// continuation is never attempted again, even after an error.
#[derive(Debug, Clone)]
pub struct ContinuationState {
    pub job_id: String,
    pub already_requested: bool,
}

impl ContinuationState {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            already_requested: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Submit and poll until the job is terminal.
    Blocking,
    /// Submit and hand the job id back without polling.
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    /// Poll bounds ran out first; whatever was extracted is still returned.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub job_id: String,
    pub outcome: JobOutcome,
    pub urls: Vec<String>,
    pub finished_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone)]
pub enum Submission {
    Accepted(String),
    Completed(GenerationResult),
}
