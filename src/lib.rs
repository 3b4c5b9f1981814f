//! Proseforge - a rate-limited AI prose generation queue
//!
//! Proseforge turns source text into an outline and then into
//! length-controlled prose, retrying generation until the result lands
//! inside the requested character window. All provider calls share one
//! sliding-window rate budget.

pub mod config;
pub mod error;
pub mod id;
pub mod job;
pub mod limiter;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod queue;

pub use error::{ProseforgeError, Result};
