//! Job queue and scheduler.
//!
//! This module provides:
//! - **JobQueue**: admits jobs, bounds concurrent processing, owns the live
//!   job set and the lifetime counters.
//! - **Promotion loop**: polls the FIFO queue and spawns attempt-loop tasks
//!   up to the concurrency limit.
//! - **Reclamation**: periodically drops terminal jobs past the retention
//!   window; lifetime counters survive.
//!
//! # Architecture
//!
//! The queue uses a polling model:
//! 1. `run` polls the pending queue every second
//! 2. Queued jobs are promoted FIFO into processing, bounded by
//!    `max_concurrent_jobs`
//! 3. Each promoted job runs as a tracked tokio task until a valid result
//!    or the attempt cap
//! 4. Finished tasks are reaped; panics fail the job, never the loop

mod service;
mod worker;

pub use service::{JobQueue, QueueStats};
