//! Drives a submitted generation job to completion: adaptive status-keyed
//! waits, a one-shot continuation submission at the batch boundary, and
//! extraction of deduplicated output URLs from whatever record was seen last.

use std::thread;
use std::time::Instant;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use dreamina_contracts::config::PollTuning;
use dreamina_contracts::errors::JobError;
use dreamina_contracts::jobs::{
    ContinuationState, GenerationResult, JobOutcome, JobRecord, JobRequest, JobStatus,
};

/// Transport seam the poller drives. The engine client implements this over
/// HTTP; tests script it.
pub trait JobBackend {
    /// Posts a generation payload and returns the job id it was accepted as.
    fn submit(&self, body: &Map<String, Value>) -> Result<String>;

    /// Fetches the history envelope that covers the given job.
    fn fetch_history(&self, job_id: &str) -> Result<Value>;
}

pub struct JobPoller<'a, B: JobBackend> {
    backend: &'a B,
    tuning: &'a PollTuning,
}

impl<'a, B: JobBackend> JobPoller<'a, B> {
    pub fn new(backend: &'a B, tuning: &'a PollTuning) -> Self {
        Self { backend, tuning }
    }

    /// Polls until the job settles or the poll bounds run out. Failed jobs
    /// surface as typed errors; running out of budget or polls is soft and
    /// returns whatever the last record held.
    pub fn run(&self, request: &JobRequest, job_id: &str) -> Result<GenerationResult> {
        let started = Instant::now();
        let mut continuation = ContinuationState::new(job_id);
        let mut last_record: Option<JobRecord> = None;
        let mut status = JobStatus::Processing;
        let mut transport_errors = 0u32;
        let mut polls = 0u32;

        while polls < self.tuning.max_polls {
            if started.elapsed() > self.tuning.budget {
                warn!(job_id, polls, "poll budget exhausted before the job settled");
                break;
            }
            polls += 1;

            let wait = self.tuning.wait_for(status, polls == 1);
            if !wait.is_zero() {
                thread::sleep(wait);
            }

            let payload = match self.backend.fetch_history(job_id) {
                Ok(payload) => {
                    transport_errors = 0;
                    payload
                }
                Err(err) => {
                    transport_errors += 1;
                    if transport_errors >= self.tuning.max_transport_errors {
                        return Err(JobError::NetworkExhausted {
                            attempts: transport_errors,
                            last_error: err.to_string(),
                        }
                        .into());
                    }
                    warn!(
                        job_id,
                        attempt = transport_errors,
                        error = %err,
                        "history fetch failed, retrying"
                    );
                    continue;
                }
            };

            let record = JobRecord::from_history(&payload, job_id)?;
            status = record.status;
            last_record = Some(record.clone());

            if let JobStatus::Unknown(code) = status {
                warn!(job_id, code, "unrecognized job status, stopping the poll");
                break;
            }

            // Marked before the submit so an error never re-fires it.
            if !continuation.already_requested
                && record.total_count > self.tuning.batch_size
                && record.finished_count == self.tuning.batch_size
            {
                continuation.already_requested = true;
                debug!(job_id, total = record.total_count, "requesting the next output batch");
                if let Err(err) = self
                    .backend
                    .submit(&request.continuation_body(&continuation.job_id))
                {
                    warn!(job_id, error = %err, "continuation submission failed, polling continues");
                }
            }

            match status {
                JobStatus::Failed => {
                    return Err(classify_failure(record.fail_code.as_deref()).into());
                }
                JobStatus::Succeeded => break,
                _ => {}
            }

            if !record.items.is_empty() {
                let all_finished =
                    record.total_count > 0 && record.finished_count >= record.total_count;
                if counts_unpopulated(&record) || all_finished {
                    debug!(job_id, polls, items = record.items.len(), "all outputs present");
                    return Ok(GenerationResult {
                        job_id: job_id.to_string(),
                        outcome: JobOutcome::Succeeded,
                        urls: extract_urls(&record.items),
                        finished_count: record.finished_count,
                        total_count: record.total_count,
                    });
                }
            }
        }

        let (urls, finished_count, total_count) = match &last_record {
            Some(record) => (
                extract_urls(&record.items),
                record.finished_count,
                record.total_count,
            ),
            None => (Vec::new(), 0, 0),
        };
        let outcome = if status == JobStatus::Succeeded {
            JobOutcome::Succeeded
        } else {
            JobOutcome::TimedOut
        };
        Ok(GenerationResult {
            job_id: job_id.to_string(),
            outcome,
            urls,
            finished_count,
            total_count,
        })
    }
}

// Video-shaped records never fill the image counters; a non-empty item list
// is then the only completion signal.
fn counts_unpopulated(record: &JobRecord) -> bool {
    record.finished_count == 0 && record.total_count == 0
}

fn classify_failure(fail_code: Option<&str>) -> JobError {
    match fail_code {
        Some("2038") => JobError::ContentRejected {
            code: "2038".to_string(),
        },
        other => JobError::Generic {
            message: format!(
                "generation failed with code {}",
                other.unwrap_or("unknown")
            ),
        },
    }
}

/// Field paths an output URL may live under. The record schema varies by job
/// type; the first non-empty hit per item wins.
const URL_PROBES: [&str; 12] = [
    "/video/transcoded_video/origin/video_url",
    "/video/video_url",
    "/video/origin/video_url",
    "/video_info/video_url",
    "/image/large_images/0/image_url",
    "/common_attr/cover_url",
    "/image/url",
    "/image/image_url",
    "/aigc_video_params/video_url",
    "/cover_url",
    "/url",
    "/video_url",
];

/// Pulls one URL out of each item and drops later duplicates. Two URLs count
/// as duplicates when they embed the same 32-char hex id.
pub fn extract_urls(items: &[Value]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut urls = Vec::new();
    for item in items {
        let Some(url) = item_url(item) else { continue };
        let identity = url_identity(url);
        if seen.iter().any(|known| known == identity) {
            continue;
        }
        seen.push(identity.to_string());
        urls.push(url.to_string());
    }
    urls
}

fn item_url(item: &Value) -> Option<&str> {
    for probe in URL_PROBES {
        if let Some(url) = item.pointer(probe).and_then(Value::as_str) {
            if !url.is_empty() {
                return Some(url);
            }
        }
    }
    let images = item.pointer("/image/large_images")?.as_array()?;
    images.iter().find_map(|image| {
        ["image_url", "url"].iter().find_map(|key| {
            image
                .get(key)
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
        })
    })
}

/// The first window of 32 consecutive lowercase hex chars, or the whole URL
/// when no such run exists.
fn url_identity(url: &str) -> &str {
    let mut run_start = 0;
    for (idx, byte) in url.bytes().enumerate() {
        if matches!(byte, b'0'..=b'9' | b'a'..=b'f') {
            if idx + 1 - run_start == 32 {
                return &url[run_start..idx + 1];
            }
        } else {
            run_start = idx + 1;
        }
    }
    url
}
