//! Engine configuration
//!
//! Loaded once at startup and passed into component constructors. Sources,
//! lowest precedence first: built-in defaults, an optional file, then
//! `EVOTE__*` environment variables (e.g. `EVOTE__RETRY__ATTEMPTS=3`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ledger network coordinates.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Queue substrate connection and queue names.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Redelivery policy for retryable jobs.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub channel_name: String,
    pub chaincode_name: String,
    pub msp_id: String,
    #[serde(default = "default_true")]
    pub as_localhost: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            channel_name: "ch1".to_string(),
            chaincode_name: "mycc".to_string(),
            msp_id: "SampleOrg".to_string(),
            as_localhost: true,
        }
    }
}

/// Queue substrate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_submit_queue")]
    pub submit_queue_name: String,
    #[serde(default = "default_workflow_queue")]
    pub workflow_queue_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            username: "default".to_string(),
            password: String::new(),
            submit_queue_name: default_submit_queue(),
            workflow_queue_name: default_workflow_queue(),
        }
    }
}

/// Backoff shape between redeliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Redelivery policy applied by the substrate to retryable jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total deliveries before a job is failed.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// Base delay in milliseconds.
    #[serde(default = "default_backoff_delay")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff: BackoffKind::Fixed,
            delay_ms: default_backoff_delay(),
        }
    }
}

impl RetryConfig {
    /// Delay before redelivery after `attempts_made` deliveries (1-based).
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let base = Duration::from_millis(self.delay_ms);
        match self.backoff {
            BackoffKind::Fixed => base,
            BackoffKind::Exponential => {
                let exponent = attempts_made.saturating_sub(1).min(16);
                base.saturating_mul(1u32 << exponent)
            }
        }
    }

    /// No delay between redeliveries.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            backoff: BackoffKind::Fixed,
            delay_ms: 0,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Finished jobs retained per state before eviction.
    #[serde(default = "default_retained")]
    pub max_completed_jobs: usize,

    #[serde(default = "default_retained")]
    pub max_failed_jobs: usize,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_completed_jobs: default_retained(),
            max_failed_jobs: default_retained(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_submit_queue() -> String {
    "submitContract".to_string()
}

fn default_workflow_queue() -> String {
    "CreateElection".to_string()
}

fn default_attempts() -> u32 {
    5
}

fn default_backoff_delay() -> u64 {
    3000
}

fn default_concurrency() -> usize {
    5
}

fn default_retained() -> usize {
    1000
}

fn default_poll_interval() -> u64 {
    250
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("EVOTE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Configuration for local runs: no redelivery delay.
    pub fn development() -> Self {
        Self {
            retry: RetryConfig::immediate(default_attempts()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.ledger.channel_name, "ch1");
        assert_eq!(config.ledger.chaincode_name, "mycc");
        assert_eq!(config.queue.port, 6379);
        assert_eq!(config.queue.submit_queue_name, "submitContract");
        assert_eq!(config.queue.workflow_queue_name, "CreateElection");
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.backoff, BackoffKind::Fixed);
        assert_eq!(config.worker.concurrency, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_fixed_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(1), Duration::from_millis(3000));
        assert_eq!(retry.delay_for(4), Duration::from_millis(3000));
    }

    #[test]
    fn test_exponential_backoff() {
        let retry = RetryConfig {
            attempts: 5,
            backoff: BackoffKind::Exponential,
            delay_ms: 100,
        };
        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.retry.delay_ms, 3000);
        assert_eq!(config.ledger.msp_id, "SampleOrg");
    }

    #[test]
    fn test_development_has_no_delay() {
        let config = EngineConfig::development();
        assert_eq!(config.retry.delay_for(3), Duration::ZERO);
    }

    #[test]
    fn test_backoff_kind_serde() {
        let kind: BackoffKind = serde_json::from_str("\"exponential\"").unwrap();
        assert_eq!(kind, BackoffKind::Exponential);
    }
}
