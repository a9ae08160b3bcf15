//! Forecast Result Model
//!
//! Structured numeric output of the forecast-computation stage, read as
//! trusted input by every later stage. Validation lives here: any writer
//! must enforce the numeric invariants before the context advances past
//! `forecast_done`, and downstream stages never re-derive probabilities.
//!
//! Invariants:
//! - `win_prob` ∈ [0, 1] for every target
//! - `seat_std` ≥ 0 (and `vote_share_std` ≥ 0 when present)
//! - quantiles non-decreasing in label order: p10 ≤ p50 ≤ p90

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quantile labels in ascending order. Any quantile map a target carries
/// must be non-decreasing along this order.
pub const QUANTILE_LABELS: [&str; 3] = ["p10", "p50", "p90"];

/// Calibration flag: total poll sample beneath the configured floor.
pub const FLAG_LOW_SAMPLE: &str = "low-sample";
/// Calibration flag: p10–p90 band wide relative to the seat mean.
pub const FLAG_WIDE_INTERVAL: &str = "wide-interval";

/// Default model label, kept stable for calibration tracking across runs.
pub const DEFAULT_MODEL_NAME: &str = "elections_seat_model";

// ============================================================================
// Errors
// ============================================================================

/// Numeric invariant violation in a forecast result.
///
/// Raised at construction and re-checked by the orchestrator before a
/// context advances past `forecast_done`. Treated as fatal (a contract
/// violation, not a transient failure) — never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataInvariantError {
    #[error("win_prob for '{party}' is {value}, outside [0, 1]")]
    WinProbOutOfRange { party: String, value: f64 },

    #[error("{field} for '{party}' is {value}, must be ≥ 0")]
    NegativeSpread {
        party: String,
        field: &'static str,
        value: f64,
    },

    #[error("quantiles for '{party}' not monotonic: {lower_label}={lower} > {upper_label}={upper}")]
    QuantileOrder {
        party: String,
        lower_label: String,
        lower: f64,
        upper_label: String,
        upper: f64,
    },

    #[error("{field} for '{party}' is not a finite number")]
    NonFinite { party: String, field: &'static str },

    #[error("forecast result has no targets")]
    EmptyTargets,
}

// ============================================================================
// Party Forecast
// ============================================================================

/// Forecast for a single party/candidate: one row of a forecast result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyForecast {
    pub party: String,
    pub seat_mean: f64,
    pub seat_std: f64,
    pub win_prob: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vote_share_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vote_share_std: Option<f64>,
    /// Quantile label ("p10"/"p50"/"p90") to seat value
    #[serde(default)]
    pub quantiles: BTreeMap<String, f64>,
}

impl PartyForecast {
    /// Build a validated party forecast. Rejects out-of-range probabilities
    /// and negative spreads at construction.
    pub fn new(
        party: impl Into<String>,
        seat_mean: f64,
        seat_std: f64,
        win_prob: f64,
    ) -> Result<Self, DataInvariantError> {
        let forecast = Self {
            party: party.into(),
            seat_mean,
            seat_std,
            win_prob,
            vote_share_mean: None,
            vote_share_std: None,
            quantiles: BTreeMap::new(),
        };
        forecast.validate()?;
        Ok(forecast)
    }

    /// Attach a validated vote-share estimate.
    pub fn with_vote_share(
        mut self,
        mean: f64,
        std: f64,
    ) -> Result<Self, DataInvariantError> {
        self.vote_share_mean = Some(mean);
        self.vote_share_std = Some(std);
        self.validate()?;
        Ok(self)
    }

    /// Attach validated p10/p50/p90 quantiles (must be non-decreasing).
    pub fn with_quantiles(
        mut self,
        p10: f64,
        p50: f64,
        p90: f64,
    ) -> Result<Self, DataInvariantError> {
        self.quantiles.insert("p10".to_string(), p10);
        self.quantiles.insert("p50".to_string(), p50);
        self.quantiles.insert("p90".to_string(), p90);
        self.validate()?;
        Ok(self)
    }

    /// Check every numeric invariant on this row.
    ///
    /// Also used by the orchestrator's post-forecast gate, so a result that
    /// bypassed the constructors (e.g. deserialized) is still caught before
    /// the context advances.
    pub fn validate(&self) -> Result<(), DataInvariantError> {
        for (field, value) in [
            ("seat_mean", self.seat_mean),
            ("seat_std", self.seat_std),
            ("win_prob", self.win_prob),
        ] {
            if !value.is_finite() {
                return Err(DataInvariantError::NonFinite {
                    party: self.party.clone(),
                    field,
                });
            }
        }

        if !(0.0..=1.0).contains(&self.win_prob) {
            return Err(DataInvariantError::WinProbOutOfRange {
                party: self.party.clone(),
                value: self.win_prob,
            });
        }
        if self.seat_std < 0.0 {
            return Err(DataInvariantError::NegativeSpread {
                party: self.party.clone(),
                field: "seat_std",
                value: self.seat_std,
            });
        }
        if let Some(std) = self.vote_share_std {
            if std < 0.0 {
                return Err(DataInvariantError::NegativeSpread {
                    party: self.party.clone(),
                    field: "vote_share_std",
                    value: std,
                });
            }
        }

        // Quantiles must be non-decreasing along the label order; labels
        // the map does not carry are skipped.
        let mut last: Option<(&str, f64)> = None;
        for label in QUANTILE_LABELS {
            if let Some(&value) = self.quantiles.get(label) {
                if !value.is_finite() {
                    return Err(DataInvariantError::NonFinite {
                        party: self.party.clone(),
                        field: "quantiles",
                    });
                }
                if let Some((lower_label, lower)) = last {
                    if lower > value {
                        return Err(DataInvariantError::QuantileOrder {
                            party: self.party.clone(),
                            lower_label: lower_label.to_string(),
                            lower,
                            upper_label: label.to_string(),
                            upper: value,
                        });
                    }
                }
                last = Some((label, value));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Forecast Result
// ============================================================================

/// Output of the forecast-computation stage.
///
/// Read-only from the orchestrator's perspective once written; drafting and
/// critique treat it as trusted input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub targets: Vec<PartyForecast>,
    pub model_name: String,
    pub run_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ForecastResult {
    /// Build a validated result. A forecast must always produce at least
    /// one target — an empty list is rejected here and escalated as a
    /// contract violation by the orchestrator.
    pub fn new(targets: Vec<PartyForecast>) -> Result<Self, DataInvariantError> {
        let result = Self {
            targets,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            run_at: Utc::now(),
            metadata: BTreeMap::new(),
        };
        result.validate()?;
        Ok(result)
    }

    /// Re-check all invariants (non-empty targets, per-target numerics).
    pub fn validate(&self) -> Result<(), DataInvariantError> {
        if self.targets.is_empty() {
            return Err(DataInvariantError::EmptyTargets);
        }
        for target in &self.targets {
            target.validate()?;
        }
        Ok(())
    }

    /// Target with the highest win probability, if any.
    pub fn favourite(&self) -> Option<&PartyForecast> {
        self.targets
            .iter()
            .max_by(|a, b| a.win_prob.total_cmp(&b.win_prob))
    }
}

// ============================================================================
// Tests
// ============================================================================
