//! Terminal-state notifications.
//!
//! A background dispatcher polls the queue for jobs that reached COMPLETED
//! or FAILED and delivers a one-time `JobNotice` to the submitting caller
//! through the `Notifier` trait. The trait decouples delivery from the
//! actual message transport, which belongs to the chat front end.
//!
//! Delivery is at-most-once per job for the life of the process, guarded by
//! an in-memory set; nothing is persisted, matching the jobs themselves.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::job::{Job, JobStatus};
use crate::queue::JobQueue;

/// Terminal outcome carried by a notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { content: String, char_count: usize },
    Failed { reason: String },
}

/// One-time terminal result delivery for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNotice {
    pub job_id: String,
    pub owner_id: i64,
    pub outcome: JobOutcome,
    pub attempt_count: u32,
    pub successful_attempts: u32,
    pub valid_responses: u32,
    pub invalid_responses: u32,
    pub elapsed_secs: i64,
}

impl JobNotice {
    /// Build a notice from a terminal job snapshot.
    pub fn from_job(job: &Job) -> Self {
        let outcome = match job.status {
            JobStatus::Completed => match job.final_result() {
                Some(result) => JobOutcome::Completed {
                    content: result.content.clone(),
                    char_count: result.char_count,
                },
                // Completed implies a valid result; guard anyway
                None => JobOutcome::Failed {
                    reason: "completed without a recorded result".to_string(),
                },
            },
            _ => JobOutcome::Failed {
                reason: job
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            },
        };

        Self {
            job_id: job.id.clone(),
            owner_id: job.owner_id,
            outcome,
            attempt_count: job.attempt_count,
            successful_attempts: job.successful_attempts,
            valid_responses: job.valid_responses,
            invalid_responses: job.invalid_responses,
            elapsed_secs: (chrono::Utc::now() - job.created_at).num_seconds(),
        }
    }
}

/// Delivery seam consumed by the dispatcher.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notice: JobNotice) -> Result<()>;
}

/// Default notifier that writes notices to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notice: JobNotice) -> Result<()> {
        match &notice.outcome {
            JobOutcome::Completed { char_count, .. } => {
                tracing::info!(
                    job_id = %notice.job_id,
                    owner_id = notice.owner_id,
                    attempts = notice.attempt_count,
                    valid = notice.valid_responses,
                    invalid = notice.invalid_responses,
                    char_count,
                    elapsed_secs = notice.elapsed_secs,
                    "Job completed"
                );
            }
            JobOutcome::Failed { reason } => {
                tracing::warn!(
                    job_id = %notice.job_id,
                    owner_id = notice.owner_id,
                    attempts = notice.attempt_count,
                    reason = %reason,
                    elapsed_secs = notice.elapsed_secs,
                    "Job failed"
                );
            }
        }
        Ok(())
    }
}

/// Polls for newly terminal jobs and delivers each exactly once.
pub struct NotificationDispatcher {
    queue: Arc<JobQueue>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    notified: Mutex<HashSet<String>>,
    stopped: AtomicBool,
}

impl NotificationDispatcher {
    pub fn new(queue: Arc<JobQueue>, notifier: Arc<dyn Notifier>, poll_interval: Duration) -> Self {
        Self {
            queue,
            notifier,
            poll_interval,
            notified: Mutex::new(HashSet::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Run the notification loop until `shutdown` is called.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("Notification dispatcher started");
        while !self.stopped.load(Ordering::SeqCst) {
            self.poll_once().await;
            tokio::time::sleep(self.poll_interval).await;
        }
        tracing::info!("Notification dispatcher stopped");
    }

    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// One sweep over terminal jobs. A delivery error is logged but still
    /// marks the job notified; re-sending on the next sweep would risk
    /// duplicates, the worse failure mode for a chat surface.
    pub async fn poll_once(&self) {
        let pending: Vec<Job> = {
            let notified = self.notified.lock().unwrap();
            self.queue
                .terminal_jobs()
                .into_iter()
                .filter(|job| !notified.contains(&job.id))
                .collect()
        };

        for job in pending {
            let notice = JobNotice::from_job(&job);
            if let Err(e) = self.notifier.deliver(notice).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to deliver notification");
            }
            self.notified.lock().unwrap().insert(job.id);
        }
    }
}
