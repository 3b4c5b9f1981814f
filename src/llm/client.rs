//! Core generation client trait and test double.

use async_trait::async_trait;

use crate::error::{ProseforgeError, Result};

/// The two remote generation operations the pipeline consumes.
///
/// Both are opaque calls that may fail or take seconds to minutes; prose
/// generation errors may carry a rate-limit indicator.
#[async_trait]
pub trait GenerateClient: Send + Sync {
    /// Generate a structured outline from source text.
    ///
    /// `sample_text`, when present, is included as a formatting reference
    /// only; the outline itself must come from `source_text`.
    async fn generate_outline(
        &self,
        source_text: &str,
        instructions: &str,
        sample_text: Option<&str>,
    ) -> Result<String>;

    /// Expand an outline into prose aimed at `target_length` characters.
    async fn generate_prose(&self, outline: &str, target_length: usize, instructions: &str) -> Result<String>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// A scripted response for `MockGenerateClient`.
pub enum MockResponse {
    Text(String),
    Error(ProseforgeError),
}

/// Mock client that replays scripted prose responses in order.
///
/// Outline calls echo a canned outline. Once the script is exhausted,
/// further prose calls return the last scripted text (or an error if the
/// script was empty).
pub struct MockGenerateClient {
    responses: std::sync::Mutex<std::collections::VecDeque<MockResponse>>,
    calls: std::sync::atomic::AtomicU32,
}

impl MockGenerateClient {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            calls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Convenience: a client that always returns `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::Text(text.into())])
    }

    /// Number of prose calls made so far.
    pub fn prose_calls(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerateClient for MockGenerateClient {
    async fn generate_outline(
        &self,
        source_text: &str,
        _instructions: &str,
        _sample_text: Option<&str>,
    ) -> Result<String> {
        let head: String = source_text.chars().take(80).collect();
        Ok(format!("# Outline\n\n{}", head))
    }

    async fn generate_prose(&self, _outline: &str, _target_length: usize, _instructions: &str) -> Result<String> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        match responses.front() {
            None => Err(ProseforgeError::Llm("mock script exhausted".to_string())),
            // The final scripted text repeats; errors are always consumed.
            Some(MockResponse::Text(text)) if responses.len() == 1 => Ok(text.clone()),
            Some(_) => match responses.pop_front().unwrap() {
                MockResponse::Text(text) => Ok(text),
                MockResponse::Error(e) => Err(e),
            },
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
