//! Per-job attempt loop.
//!
//! One task owns one PROCESSING job for its entire lifetime and is the only
//! writer of that job's progress fields. Provider errors never end the job;
//! only a valid result or the attempt cap does.

use std::time::Duration;

use crate::error::Result;
use crate::job::JobStatus;
use crate::llm::call_with_retry;
use crate::queue::service::JobQueue;

/// Pacing between successful-but-invalid attempts; avoids a tight loop.
const INVALID_RESULT_DELAY: Duration = Duration::from_secs(1);

/// Outer cooldown after the retry wrapper gave up on rate limits, separate
/// from its own internal backoff.
const RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

/// Delay after a non-rate-limit error exhausted its retries.
const ERROR_DELAY: Duration = Duration::from_secs(5);

impl JobQueue {
    /// Drive one job to a terminal state. Every outcome, including an error
    /// escaping the attempt loop, is contained at the job boundary.
    pub(crate) async fn process_job(&self, job_id: &str) {
        let outcome = self.attempt_loop(job_id).await;
        self.finish_job(job_id, outcome);
    }

    /// Repeat generation attempts until a valid result or the attempt cap.
    ///
    /// Returns `Ok(true)` on a valid result, `Ok(false)` on cap exhaustion.
    async fn attempt_loop(&self, job_id: &str) -> Result<bool> {
        let (outline, instructions, target_length, max_attempts) = {
            let job = self
                .get(job_id)
                .ok_or_else(|| crate::error::ProseforgeError::JobNotFound(job_id.to_string()))?;
            debug_assert_eq!(job.status, JobStatus::Processing);
            let target_length = job.target_length();
            (job.outline, job.instructions, target_length, self.max_attempts_per_job())
        };

        let mut found_valid = false;

        loop {
            let attempt = match self.begin_attempt(job_id, max_attempts) {
                Some(attempt) => attempt,
                None => break,
            };

            let client = self.client.clone();
            let call = || {
                let client = client.clone();
                let outline = outline.clone();
                let instructions = instructions.clone();
                async move { client.generate_prose(&outline, target_length, &instructions).await }
            };

            match call_with_retry(&self.limiter, self.estimates, self.retry_attempts, call).await {
                Ok(text) => {
                    found_valid = self.record_attempt_result(job_id, text)?;
                    if found_valid {
                        break;
                    }
                    tokio::time::sleep(INVALID_RESULT_DELAY).await;
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, attempt, error = %e, "Attempt errored");
                    if e.is_rate_limit() {
                        tracing::info!(job_id = %job_id, "Rate limit hit, cooling down for 60 seconds");
                        tokio::time::sleep(RATE_LIMIT_DELAY).await;
                    } else {
                        tokio::time::sleep(ERROR_DELAY).await;
                    }
                }
            }
        }

        Ok(found_valid)
    }

    /// Bump the attempt counter if budget remains; None ends the loop.
    fn begin_attempt(&self, job_id: &str, max_attempts: u32) -> Option<u32> {
        self.with_job(job_id, |job| {
            if job.attempt_count >= max_attempts {
                None
            } else {
                job.attempt_count += 1;
                Some(job.attempt_count)
            }
        })
        .flatten()
    }

    /// Record a non-error result against the job; returns validity.
    fn record_attempt_result(&self, job_id: &str, text: String) -> Result<bool> {
        self.with_job(job_id, |job| job.record_result(text))
            .ok_or_else(|| crate::error::ProseforgeError::JobNotFound(job_id.to_string()))
    }
}
