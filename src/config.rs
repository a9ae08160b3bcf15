//! Pipeline Configuration
//!
//! Deployment-tunable parameters loaded from TOML. Every section is
//! `#[serde(default)]`, so a missing file or a partial file behaves like
//! the built-in defaults.
//!
//! ## Loading Order
//!
//! 1. `FORESIGHT_CONFIG` environment variable (path to TOML file)
//! 2. `foresight.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded config is passed explicitly into `Orchestrator::new` — there
//! is no process-global config state.

use crate::context::IssueSeverity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file path.
pub const CONFIG_ENV_VAR: &str = "FORESIGHT_CONFIG";

/// Default config file name in the working directory.
pub const CONFIG_FILE_NAME: &str = "foresight.toml";

/// Config load failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Sections
// ============================================================================

/// Per-agent retry policy. Bounds are deployment parameters, not core
/// invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum invocation attempts per agent (minimum 1)
    pub max_attempts: u32,
    /// Backoff before attempt n+1: base * 2^(n-1)
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 200,
        }
    }
}

impl RetryConfig {
    /// Backoff delay before the retry following `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Time budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-agent invocation budget; exceeding it counts as an agent failure
    pub agent_budget_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { agent_budget_secs: 30 }
    }
}

impl TimeoutConfig {
    pub fn agent_budget(&self) -> Duration {
        Duration::from_secs(self.agent_budget_secs)
    }
}

/// Review-gate policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Critic issues at or above this severity hold the run for review
    pub severity_threshold: IssueSeverity,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            severity_threshold: IssueSeverity::High,
        }
    }
}

/// Forecast-stage tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastTuning {
    /// Monte Carlo iterations per forecast
    pub simulation_runs: u32,
    /// Seats in the simulated chamber
    pub total_seats: u32,
    /// Total poll sample below this appends the low-sample flag
    pub low_sample_threshold: u64,
    /// (p90 - p10) / seat_mean above this appends the wide-interval flag
    pub wide_interval_ratio: f64,
}

impl Default for ForecastTuning {
    fn default() -> Self {
        Self {
            simulation_runs: 2000,
            total_seats: 650,
            low_sample_threshold: 5000,
            wide_interval_ratio: 0.5,
        }
    }
}

/// Storage paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the sled-backed terminal sink
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    pub review: ReviewConfig,
    pub forecast: ForecastTuning,
    pub storage: StorageConfig,
}

impl PipelineConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded pipeline config from {CONFIG_ENV_VAR}");
                        return config.sanitized();
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        let local = Path::new(CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(config) => {
                    info!(path = CONFIG_FILE_NAME, "Loaded pipeline config");
                    return config.sanitized();
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse {CONFIG_FILE_NAME}, using defaults");
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Load and parse a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Clamp nonsensical values, warning about each adjustment.
    pub fn sanitized(mut self) -> Self {
        if self.retry.max_attempts == 0 {
            warn!("retry.max_attempts = 0 is invalid, clamping to 1");
            self.retry.max_attempts = 1;
        }
        if self.timeouts.agent_budget_secs == 0 {
            warn!("timeouts.agent_budget_secs = 0 is invalid, clamping to 1");
            self.timeouts.agent_budget_secs = 1;
        }
        if self.forecast.simulation_runs < 100 {
            warn!(
                runs = self.forecast.simulation_runs,
                "forecast.simulation_runs too low for stable quantiles, clamping to 100"
            );
            self.forecast.simulation_runs = 100;
        }
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.review.severity_threshold, IssueSeverity::High);
        assert_eq!(config.forecast.total_seats, 650);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [retry]
            max_attempts = 5

            [review]
            severity_threshold = "medium"
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_base_ms, 200);
        assert_eq!(config.review.severity_threshold, IssueSeverity::Medium);
        assert_eq!(config.timeouts.agent_budget_secs, 30);
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryConfig {
            max_attempts: 4,
            backoff_base_ms: 100,
        };
        assert_eq!(retry.backoff_after(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_after(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_sanitize_clamps_zero_attempts() {
        let config = PipelineConfig {
            retry: RetryConfig {
                max_attempts: 0,
                backoff_base_ms: 50,
            },
            ..Default::default()
        };
        assert_eq!(config.sanitized().retry.max_attempts, 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foresight.toml");
        std::fs::write(&path, "[forecast]\nsimulation_runs = 500\n").unwrap();

        let config = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.forecast.simulation_runs, 500);
    }
}
