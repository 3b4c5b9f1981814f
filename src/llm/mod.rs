//! Generation provider layer.
//!
//! This module provides:
//! - `GenerateClient` trait for the two remote operations (outline, prose)
//! - `AnthropicClient` implementation over the messages API
//! - `call_with_retry`, the bounded-backoff wrapper around one remote call

pub mod anthropic;
pub mod client;
pub mod retry;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{GenerateClient, MockGenerateClient, MockResponse};
pub use retry::{TokenEstimates, call_with_retry};
