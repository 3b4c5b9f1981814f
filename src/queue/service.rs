//! The JobQueue service: admission, promotion, statistics, reclamation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::error::{ProseforgeError, Result};
use crate::job::{Job, JobStatus};
use crate::limiter::RateLimiter;
use crate::llm::{GenerateClient, TokenEstimates};

/// Queue statistics: live per-status counts plus lifetime counters.
///
/// The lifetime counters survive reclamation; they are the only durable
/// memory of historical throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    /// Lifetime completed, including reclaimed jobs
    pub completed: u64,
    /// Lifetime failed, including reclaimed jobs
    pub failed: u64,
    /// Jobs currently tracked, any status
    pub active_jobs: usize,
    pub total_processed: u64,
}

/// Mutable queue state, guarded by one mutex.
///
/// Contention is low: promotion runs once per second and each job's attempt
/// loop takes the lock only to bump its own record.
#[derive(Debug, Default)]
struct QueueState {
    jobs: HashMap<String, Job>,
    pending: VecDeque<String>,
    processing: Vec<String>,
    total_completed: u64,
    total_failed: u64,
    total_processed: u64,
}

/// Admits generation jobs and drives them to a terminal state under the
/// shared rate budget.
pub struct JobQueue {
    config: QueueConfig,
    pub(crate) client: Arc<dyn GenerateClient>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) estimates: TokenEstimates,
    pub(crate) retry_attempts: u32,
    state: Mutex<QueueState>,
    /// Attempt-loop tasks, tracked so shutdown can abort them.
    running: Mutex<HashMap<String, JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl JobQueue {
    pub fn new(
        client: Arc<dyn GenerateClient>,
        limiter: Arc<RateLimiter>,
        config: QueueConfig,
        estimates: TokenEstimates,
        retry_attempts: u32,
    ) -> Self {
        Self {
            config,
            client,
            limiter,
            estimates,
            retry_attempts,
            state: Mutex::new(QueueState::default()),
            running: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn max_attempts_per_job(&self) -> u32 {
        self.config.max_attempts_per_job
    }

    /// Submit a new job; returns its id. The job waits in FIFO order until
    /// a processing slot frees up.
    pub fn submit(
        &self,
        owner_id: i64,
        outline: impl Into<String>,
        instructions: impl Into<String>,
        target_volume: impl Into<String>,
        min_length: usize,
        max_length: usize,
    ) -> Result<String> {
        if min_length > max_length {
            return Err(ProseforgeError::InvalidState(format!(
                "min_length {} exceeds max_length {}",
                min_length, max_length
            )));
        }

        let job = Job::new(owner_id, outline, instructions, target_volume, min_length, max_length);
        let job_id = job.id.clone();

        let mut state = self.state.lock().unwrap();
        state.pending.push_back(job_id.clone());
        state.jobs.insert(job_id.clone(), job);
        tracing::info!(job_id = %job_id, queue_size = state.pending.len(), "Job added to queue");

        Ok(job_id)
    }

    /// Snapshot of a job by id.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.state.lock().unwrap().jobs.get(job_id).cloned()
    }

    /// Run `f` against a job's mutable record under the state lock.
    pub(crate) fn with_job<R>(&self, job_id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let mut state = self.state.lock().unwrap();
        state.jobs.get_mut(job_id).map(f)
    }

    /// Snapshots of all jobs belonging to one owner.
    pub fn list_by_owner(&self, owner_id: i64) -> Vec<Job> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|job| job.owner_id == owner_id)
            .cloned()
            .collect()
    }

    /// Snapshots of all terminal jobs, consumed by the notification
    /// dispatcher.
    pub fn terminal_jobs(&self) -> Vec<Job> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Remove a job from the queue and tracking entirely.
    pub fn remove(&self, job_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.jobs.remove(job_id).is_some() {
            state.pending.retain(|id| id != job_id);
            state.processing.retain(|id| id != job_id);
            tracing::info!(job_id = %job_id, "Removed job");
            true
        } else {
            false
        }
    }

    /// Cancel a non-terminal job: abort its attempt-loop task if one is
    /// running and mark it failed with a cancellation reason.
    ///
    /// Returns false for unknown or already-terminal jobs.
    pub fn cancel(&self, job_id: &str) -> bool {
        {
            let state = self.state.lock().unwrap();
            match state.jobs.get(job_id) {
                Some(job) if !job.status.is_terminal() => {}
                _ => return false,
            }
        }

        if let Some(handle) = self.running.lock().unwrap().remove(job_id) {
            handle.abort();
        }
        self.state.lock().unwrap().pending.retain(|id| id != job_id);
        self.finish_job(job_id, Err(ProseforgeError::InvalidState("cancelled by owner".to_string())));
        tracing::info!(job_id = %job_id, "Job cancelled");
        true
    }

    /// Current queue statistics.
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock().unwrap();
        let mut queued = 0;
        let mut processing = 0;
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Queued => queued += 1,
                JobStatus::Processing => processing += 1,
                _ => {}
            }
        }
        QueueStats {
            queued,
            processing,
            completed: state.total_completed,
            failed: state.total_failed,
            active_jobs: state.jobs.len(),
            total_processed: state.total_processed,
        }
    }

    /// Run the promotion loop until `shutdown` is called.
    ///
    /// Each tick reaps finished tasks, promotes queued jobs into free
    /// processing slots, and periodically reclaims old terminal jobs.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("Queue processor started");
        let mut since_cleanup = Duration::ZERO;
        let poll_interval = Duration::from_secs(self.config.poll_interval_secs);
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval_secs);

        while !self.stopped.load(Ordering::SeqCst) {
            self.reap_finished().await;
            self.promote();

            since_cleanup += poll_interval;
            if since_cleanup >= cleanup_interval {
                self.reclaim(chrono::Duration::hours(self.config.retention_hours));
                since_cleanup = Duration::ZERO;
            }

            tokio::time::sleep(poll_interval).await;
        }
        tracing::info!("Queue processor stopped");
    }

    /// Stop the promotion loop and abort all in-flight job tasks.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut running = self.running.lock().unwrap();
        for (job_id, handle) in running.drain() {
            tracing::info!(job_id = %job_id, "Aborting in-flight job task");
            handle.abort();
        }
    }

    /// Promote queued jobs into processing while slots are free.
    pub(crate) fn promote(self: &Arc<Self>) {
        loop {
            let job_id = {
                let mut state = self.state.lock().unwrap();
                if state.processing.len() >= self.config.max_concurrent_jobs {
                    return;
                }
                let Some(job_id) = state.pending.pop_front() else {
                    return;
                };
                // A removed job can leave a dangling pending entry
                let Some(job) = state.jobs.get_mut(&job_id) else {
                    continue;
                };
                job.status = JobStatus::Processing;
                state.processing.push(job_id.clone());
                job_id
            };

            tracing::info!(job_id = %job_id, "Starting processing");
            let queue = self.clone();
            let id = job_id.clone();
            let handle = tokio::spawn(async move {
                queue.process_job(&id).await;
            });
            self.running.lock().unwrap().insert(job_id, handle);
        }
    }

    /// Reap finished job tasks. A panicked task fails its job; it never
    /// takes down the promotion loop or sibling jobs.
    pub(crate) async fn reap_finished(&self) {
        let finished: Vec<(String, JoinHandle<()>)> = {
            let mut running = self.running.lock().unwrap();
            let ids: Vec<String> = running
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| running.remove(&id).map(|handle| (id, handle)))
                .collect()
        };

        for (job_id, handle) in finished {
            if let Err(e) = handle.await {
                tracing::error!(job_id = %job_id, error = ?e, "Job task panicked");
                self.finish_job(&job_id, Err(ProseforgeError::InvalidState(format!("job task panicked: {}", e))));
            }
        }
    }

    /// Transition a job to its terminal state and update lifetime counters.
    ///
    /// `Ok(true)` means a valid result was found, `Ok(false)` means the
    /// attempt cap was exhausted, `Err` carries an error that escaped the
    /// attempt loop. Terminal jobs are left untouched.
    pub(crate) fn finish_job(&self, job_id: &str, outcome: Result<bool>) {
        let mut state = self.state.lock().unwrap();
        state.processing.retain(|id| id != job_id);

        let max_attempts = self.config.max_attempts_per_job;
        let Some(job) = state.jobs.get_mut(job_id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }

        let completed = match outcome {
            Ok(true) => {
                job.status = JobStatus::Completed;
                tracing::info!(job_id = %job_id, attempts = job.attempt_count, "Job completed");
                true
            }
            Ok(false) => {
                job.status = JobStatus::Failed;
                job.error_message = Some(format!("Max attempts ({}) reached without valid result", max_attempts));
                tracing::warn!(job_id = %job_id, attempts = job.attempt_count, "Job failed, attempts exhausted");
                false
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error_message = Some(e.to_string());
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
                false
            }
        };

        if completed {
            state.total_completed += 1;
        } else {
            state.total_failed += 1;
        }
        state.total_processed += 1;
    }

    /// Drop terminal jobs older than `max_age` from the live set.
    /// Lifetime counters are unaffected.
    pub fn reclaim(&self, max_age: chrono::Duration) {
        let cutoff = chrono::Utc::now() - max_age;
        let stale: Vec<String> = {
            let state = self.state.lock().unwrap();
            state
                .jobs
                .values()
                .filter(|job| job.status.is_terminal() && job.created_at <= cutoff)
                .map(|job| job.id.clone())
                .collect()
        };

        for job_id in &stale {
            self.remove(job_id);
        }
        if !stale.is_empty() {
            tracing::info!(count = stale.len(), "Reclaimed old jobs");
        }
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
