//! Error types for proseforge
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in proseforge
#[derive(Debug, Error)]
pub enum ProseforgeError {
    /// Job not found in the queue
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Generation provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// The provider rejected a request with 429
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Retry budget spent entirely on rate-limit rejections.
    /// The job loop treats this as transient, not as job failure.
    #[error("Rate limit exceeded after {attempts} attempts, will retry later")]
    RateLimitExhausted { attempts: u32 },

    /// Config loading/parsing error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProseforgeError {
    /// Whether this error indicates provider-side throttling.
    ///
    /// Besides the typed variants, error text is inspected for the markers
    /// the provider puts in 429 bodies ("rate_limit", "429"), since opaque
    /// transport errors can carry the condition as text only.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            ProseforgeError::RateLimited { .. } | ProseforgeError::RateLimitExhausted { .. } => true,
            ProseforgeError::Llm(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("rate_limit") || lower.contains("429")
            }
            _ => false,
        }
    }
}

/// Result type alias for proseforge operations
pub type Result<T> = std::result::Result<T, ProseforgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_not_found_error() {
        let err = ProseforgeError::JobNotFound("1737802800-0001".to_string());
        assert_eq!(err.to_string(), "Job not found: 1737802800-0001");
    }

    #[test]
    fn test_invalid_state_error() {
        let err = ProseforgeError::InvalidState("job already terminal".to_string());
        assert_eq!(err.to_string(), "Invalid state: job already terminal");
    }

    #[test]
    fn test_rate_limited_error_display() {
        let err = ProseforgeError::RateLimited { retry_after_secs: 30 };
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
    }

    #[test]
    fn test_rate_limit_exhausted_display() {
        let err = ProseforgeError::RateLimitExhausted { attempts: 3 };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded after 3 attempts, will retry later"
        );
    }

    #[test]
    fn test_is_rate_limit_typed_variants() {
        assert!(ProseforgeError::RateLimited { retry_after_secs: 1 }.is_rate_limit());
        assert!(ProseforgeError::RateLimitExhausted { attempts: 3 }.is_rate_limit());
    }

    #[test]
    fn test_is_rate_limit_from_text() {
        assert!(ProseforgeError::Llm("API error 429: overloaded".into()).is_rate_limit());
        assert!(ProseforgeError::Llm("rate_limit_error from provider".into()).is_rate_limit());
        assert!(!ProseforgeError::Llm("connection reset".into()).is_rate_limit());
    }

    #[test]
    fn test_is_rate_limit_other_variants() {
        assert!(!ProseforgeError::JobNotFound("x".into()).is_rate_limit());
        assert!(!ProseforgeError::Config("bad yaml".into()).is_rate_limit());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ProseforgeError = io_err.into();
        assert!(matches!(err, ProseforgeError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ProseforgeError = json_err.into();
        assert!(matches!(err, ProseforgeError::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(ProseforgeError::InvalidState("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
