use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub provider: ProviderConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub queue: QueueConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 64000,
            timeout_ms: 300000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests_per_minute: usize,
    pub max_input_tokens_per_minute: u64,
    pub max_output_tokens_per_minute: u64,
    pub min_request_interval_ms: u64,
    /// Static per-call token estimates; the provider's true counts vary,
    /// these stand in for them when charging the windows.
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 1000,
            max_input_tokens_per_minute: 450000,
            max_output_tokens_per_minute: 90000,
            min_request_interval_ms: 100,
            estimated_input_tokens: 4000,
            estimated_output_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs in PROCESSING at once. Raising this past 1 does not raise
    /// throughput while the rate limiter admits one request at a time.
    pub max_concurrent_jobs: usize,
    pub max_attempts_per_job: u32,
    pub poll_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub retention_hours: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            max_attempts_per_job: 20,
            poll_interval_secs: 1,
            cleanup_interval_secs: 600,
            retention_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub poll_interval_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 5 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            provider: ProviderConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            queue: QueueConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.rate_limit.max_requests_per_minute, 1000);
        assert_eq!(config.rate_limit.max_input_tokens_per_minute, 450000);
        assert_eq!(config.rate_limit.max_output_tokens_per_minute, 90000);
        assert_eq!(config.queue.max_concurrent_jobs, 1);
        assert_eq!(config.queue.max_attempts_per_job, 20);
        assert_eq!(config.queue.retention_hours, 24);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.notify.poll_interval_secs, 5);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proseforge.yml");
        fs::write(
            &path,
            "queue:\n  max_concurrent_jobs: 3\n  max_attempts_per_job: 5\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.queue.max_concurrent_jobs, 3);
        assert_eq!(config.queue.max_attempts_per_job, 5);
        // Unspecified sections keep defaults
        assert_eq!(config.rate_limit.max_requests_per_minute, 1000);
    }

    #[test]
    fn test_load_missing_explicit_path_errors() {
        let path = PathBuf::from("/nonexistent/proseforge.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config: Config = serde_yaml::from_str("rate_limit:\n  max_requests_per_minute: 10\n").unwrap();
        assert_eq!(config.rate_limit.max_requests_per_minute, 10);
        assert_eq!(config.rate_limit.estimated_input_tokens, 4000);
        assert_eq!(config.rate_limit.min_request_interval_ms, 100);
    }
}
