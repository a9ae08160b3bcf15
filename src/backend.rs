//! Data/forecast backend collaborator.
//!
//! Specific agents (not the orchestrator) consult a [`DataBackend`] for the
//! dataset behind a forecast spec. The pipeline treats it as a black box
//! returning either a value or an error; the bundled synthetic backend is
//! deterministic per target so repeated runs of the same article produce
//! the same dataset.

use crate::context::{Dataset, Entity, ForecastSpec, PollObservation};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Uniform};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Backend collaborator failures. Always mapped to retryable agent errors
/// by the calling stage.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("no data for topic '{0}'")]
    NoData(String),
}

/// Trait abstracting where forecast datasets come from.
#[async_trait]
pub trait DataBackend: Send + Sync {
    /// Fetch observations matching a forecast spec.
    ///
    /// `entities` carries the extracted parties so the backend can scope
    /// the series; an empty slice is valid and yields a topic-default set.
    async fn fetch_dataset(
        &self,
        spec: &ForecastSpec,
        entities: &[Entity],
    ) -> Result<Dataset, BackendError>;

    /// Human-readable name for logging.
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// Synthetic Backend
// ============================================================================

/// Parties assumed when the article yields no party entities.
const DEFAULT_PARTIES: [&str; 3] = ["Unity Party", "Heritage Party", "Forward Alliance"];

/// Weekly polls generated per party.
const POLLS_PER_PARTY: usize = 12;

/// Generates poll-like series deterministically from the spec target.
///
/// Each party gets a base share plus Normal noise per weekly poll; sample
/// sizes are drawn uniformly. The RNG is seeded from a hash of the target
/// string, so the same spec always yields the same dataset.
pub struct SyntheticBackend;

impl SyntheticBackend {
    fn seed_for(target: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        target.hash(&mut hasher);
        hasher.finish()
    }
}

#[async_trait]
impl DataBackend for SyntheticBackend {
    async fn fetch_dataset(
        &self,
        spec: &ForecastSpec,
        entities: &[Entity],
    ) -> Result<Dataset, BackendError> {
        let mut parties: Vec<String> = entities
            .iter()
            .filter(|e| e.entity_type == "party")
            .map(|e| e.name.clone())
            .collect();
        if parties.is_empty() {
            parties = DEFAULT_PARTIES.iter().map(|p| (*p).to_string()).collect();
        }

        let mut rng = StdRng::seed_from_u64(Self::seed_for(&spec.target));
        let noise = Normal::new(0.0, 1.6)
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let sample_sizes = Uniform::new_inclusive(400u32, 1200u32);

        // Base shares: leader slightly ahead, remainder split evenly.
        let n = parties.len() as f64;
        let leader_share = 100.0 / n + 4.0;
        let trailing_share = (100.0 - leader_share) / (n - 1.0).max(1.0);

        let now = Utc::now();
        let mut observations = Vec::with_capacity(parties.len() * POLLS_PER_PARTY);
        for (idx, party) in parties.iter().enumerate() {
            let base = if idx == 0 { leader_share } else { trailing_share };
            for week in 0..POLLS_PER_PARTY {
                let share = (base + noise.sample(&mut rng)).clamp(0.0, 100.0);
                observations.push(PollObservation {
                    party: party.clone(),
                    share,
                    sample_size: sample_sizes.sample(&mut rng),
                    observed_at: now - Duration::weeks(week as i64),
                });
            }
        }

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("topic".to_string(), serde_json::json!(spec.topic));
        metadata.insert(
            "granularity".to_string(),
            serde_json::json!(spec.granularity),
        );

        Ok(Dataset {
            name: format!("synthetic-polls:{}", spec.topic),
            observations,
            metadata,
        })
    }

    fn backend_name(&self) -> &'static str {
        "synthetic"
    }
}

// ============================================================================
// Failing Backend (test double)
// ============================================================================

/// Always-unavailable backend for exercising the retry path.
pub struct FailingBackend;

#[async_trait]
impl DataBackend for FailingBackend {
    async fn fetch_dataset(
        &self,
        _spec: &ForecastSpec,
        _entities: &[Entity],
    ) -> Result<Dataset, BackendError> {
        Err(BackendError::Unavailable("simulated outage".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
