//! Job records and result classification.
//!
//! A `Job` tracks one outline-to-prose generation request through its
//! attempts to completion or failure. Result records are append-only; the
//! counters obey `attempt_count >= successful_attempts >= valid_responses +
//! invalid_responses` at every observation point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::generate_job_id;

/// Job status state machine: Queued -> Processing -> {Completed, Failed}.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in FIFO order for a processing slot
    Queued,
    /// Owned by exactly one attempt-loop task
    Processing,
    /// A valid result was found
    Completed,
    /// Attempt cap reached, or an error escaped the attempt loop
    Failed,
}

impl JobStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One generation attempt's output, judged against the job's length window.
/// Appended to exactly one of the two result lists, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub content: String,
    pub char_count: usize,
    /// Attempt index at the time of this result (1-based, counts errors too)
    pub attempt: u32,
    /// Successful-attempt index (1-based, excludes errored attempts)
    pub successful_attempt: u32,
    pub recorded_at: DateTime<Utc>,
    pub min_length: usize,
    pub max_length: usize,
}

/// Verdict of the length-window check for one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub is_valid: bool,
    pub char_count: usize,
}

/// Judge a generated result against an inclusive character-count window.
///
/// Counts Unicode scalars, not bytes, so non-ASCII prose is measured the
/// way readers count it.
pub fn classify(text: &str, min_length: usize, max_length: usize) -> Verdict {
    let char_count = text.chars().count();
    Verdict {
        is_valid: min_length <= char_count && char_count <= max_length,
        char_count,
    }
}

/// The unit of work: one generation request tracked through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub owner_id: i64,
    pub outline: String,
    /// Optional style instructions passed to every prose call
    pub instructions: String,
    /// Human-facing volume tag ("15k", "30k", ...)
    pub target_volume: String,
    pub min_length: usize,
    pub max_length: usize,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Every call attempt, including ones that errored
    pub attempt_count: u32,
    /// Attempts that returned a result, valid or not
    pub successful_attempts: u32,
    pub valid_responses: u32,
    pub invalid_responses: u32,
    pub valid_results: Vec<GenerationResult>,
    pub invalid_results: Vec<GenerationResult>,
    /// Set only when the job fails
    pub error_message: Option<String>,
}

impl Job {
    pub fn new(
        owner_id: i64,
        outline: impl Into<String>,
        instructions: impl Into<String>,
        target_volume: impl Into<String>,
        min_length: usize,
        max_length: usize,
    ) -> Self {
        debug_assert!(min_length <= max_length);
        Self {
            id: generate_job_id(),
            owner_id,
            outline: outline.into(),
            instructions: instructions.into(),
            target_volume: target_volume.into(),
            min_length,
            max_length,
            created_at: Utc::now(),
            status: JobStatus::Queued,
            attempt_count: 0,
            successful_attempts: 0,
            valid_responses: 0,
            invalid_responses: 0,
            valid_results: Vec::new(),
            invalid_results: Vec::new(),
            error_message: None,
        }
    }

    /// Midpoint of the window, the aim-for-the-center target passed to the
    /// generation call.
    pub fn target_length(&self) -> usize {
        (self.min_length + self.max_length) / 2
    }

    /// Record one non-error generation result: bump `successful_attempts`,
    /// classify it, and append it to exactly one result list.
    ///
    /// Returns whether the result was valid.
    pub fn record_result(&mut self, content: String) -> bool {
        let verdict = classify(&content, self.min_length, self.max_length);
        self.successful_attempts += 1;

        let record = GenerationResult {
            content,
            char_count: verdict.char_count,
            attempt: self.attempt_count,
            successful_attempt: self.successful_attempts,
            recorded_at: Utc::now(),
            min_length: self.min_length,
            max_length: self.max_length,
        };

        if verdict.is_valid {
            self.valid_responses += 1;
            self.valid_results.push(record);
            tracing::info!(
                job_id = %self.id,
                char_count = verdict.char_count,
                "Valid result"
            );
        } else {
            self.invalid_responses += 1;
            self.invalid_results.push(record);
            tracing::info!(
                job_id = %self.id,
                char_count = verdict.char_count,
                min_length = self.min_length,
                max_length = self.max_length,
                "Invalid result, outside target window"
            );
        }

        verdict.is_valid
    }

    /// The last valid result, present on every Completed job.
    pub fn final_result(&self) -> Option<&GenerationResult> {
        self.valid_results.last()
    }

    /// Counter invariant, checked by tests at observation points.
    pub fn counters_consistent(&self) -> bool {
        self.attempt_count >= self.successful_attempts
            && self.successful_attempts >= self.valid_responses + self.invalid_responses
            && self.valid_results.len() == self.valid_responses as usize
            && self.invalid_results.len() == self.invalid_responses as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job() -> Job {
        Job::new(42, "# Outline", "", "short", 100, 200)
    }

    #[test]
    fn test_job_status_as_str() {
        assert_eq!(JobStatus::Queued.as_str(), "queued");
        assert_eq!(JobStatus::Processing.as_str(), "processing");
        assert_eq!(JobStatus::Completed.as_str(), "completed");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_job_status_is_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_classify_inclusive_boundaries() {
        // Both ends of the window are valid
        assert!(classify(&"x".repeat(100), 100, 200).is_valid);
        assert!(classify(&"x".repeat(200), 100, 200).is_valid);
        assert!(!classify(&"x".repeat(99), 100, 200).is_valid);
        assert!(!classify(&"x".repeat(201), 100, 200).is_valid);
    }

    #[test]
    fn test_classify_reports_char_count() {
        let verdict = classify("hello", 1, 10);
        assert!(verdict.is_valid);
        assert_eq!(verdict.char_count, 5);
    }

    #[test]
    fn test_classify_counts_chars_not_bytes() {
        // 5 Cyrillic letters are 10 bytes but 5 chars
        let text = "слово";
        assert_eq!(text.len(), 10);
        let verdict = classify(text, 5, 5);
        assert!(verdict.is_valid);
        assert_eq!(verdict.char_count, 5);
    }

    #[test]
    fn test_classify_degenerate_window() {
        assert!(classify("abc", 3, 3).is_valid);
        assert!(!classify("ab", 3, 3).is_valid);
    }

    #[test]
    fn test_new_job_initial_state() {
        let job = test_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.owner_id, 42);
        assert_eq!(job.attempt_count, 0);
        assert_eq!(job.successful_attempts, 0);
        assert!(job.valid_results.is_empty());
        assert!(job.invalid_results.is_empty());
        assert!(job.error_message.is_none());
        assert!(job.counters_consistent());
    }

    #[test]
    fn test_target_length_is_midpoint() {
        let job = test_job();
        assert_eq!(job.target_length(), 150);
    }

    #[test]
    fn test_record_valid_result() {
        let mut job = test_job();
        job.attempt_count = 1;

        let valid = job.record_result("y".repeat(150));
        assert!(valid);
        assert_eq!(job.successful_attempts, 1);
        assert_eq!(job.valid_responses, 1);
        assert_eq!(job.invalid_responses, 0);
        assert_eq!(job.valid_results.len(), 1);
        assert_eq!(job.valid_results[0].char_count, 150);
        assert_eq!(job.valid_results[0].attempt, 1);
        assert_eq!(job.valid_results[0].successful_attempt, 1);
        assert!(job.counters_consistent());
    }

    #[test]
    fn test_record_invalid_result() {
        let mut job = test_job();
        job.attempt_count = 1;

        let valid = job.record_result("y".repeat(50));
        assert!(!valid);
        assert_eq!(job.successful_attempts, 1);
        assert_eq!(job.valid_responses, 0);
        assert_eq!(job.invalid_responses, 1);
        assert_eq!(job.invalid_results.len(), 1);
        // The window it was judged against travels with the record
        assert_eq!(job.invalid_results[0].min_length, 100);
        assert_eq!(job.invalid_results[0].max_length, 200);
        assert!(job.counters_consistent());
    }

    #[test]
    fn test_counters_over_mixed_attempts() {
        let mut job = test_job();

        // Attempt 1 errors: attempt_count bumped, nothing recorded
        job.attempt_count = 1;

        // Attempt 2 invalid, attempt 3 valid
        job.attempt_count = 2;
        job.record_result("y".repeat(50));
        job.attempt_count = 3;
        job.record_result("y".repeat(150));

        assert_eq!(job.attempt_count, 3);
        assert_eq!(job.successful_attempts, 2);
        assert_eq!(job.valid_responses, 1);
        assert_eq!(job.invalid_responses, 1);
        assert_eq!(job.valid_results[0].successful_attempt, 2);
        assert!(job.counters_consistent());
    }

    #[test]
    fn test_final_result_is_last_valid() {
        let mut job = test_job();
        job.attempt_count = 1;
        job.record_result("y".repeat(120));
        job.attempt_count = 2;
        job.record_result("z".repeat(180));

        let last = job.final_result().unwrap();
        assert_eq!(last.char_count, 180);
    }

    #[test]
    fn test_final_result_none_without_valid() {
        let mut job = test_job();
        job.attempt_count = 1;
        job.record_result("y".repeat(10));
        assert!(job.final_result().is_none());
    }

    #[test]
    fn test_job_serialization_roundtrip() {
        let mut job = test_job();
        job.attempt_count = 1;
        job.record_result("y".repeat(150));

        let json = serde_json::to_string(&job).unwrap();
        let restored: Job = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, job.id);
        assert_eq!(restored.status, job.status);
        assert_eq!(restored.valid_results, job.valid_results);
    }
}
