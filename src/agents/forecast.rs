//! Forecast Agent — Monte Carlo seat simulation.
//!
//! Estimates per-party vote share from the attached poll series, then runs
//! a Monte Carlo simulation under uniform swing: each iteration samples a
//! share per party, normalizes, converts to seats, and records the winner.
//! Win probability is the winning fraction; p10/p50/p90 come from a Normal
//! fit over the sampled seat counts.
//!
//! The RNG is seeded from the article id, so the same context yields the
//! same result (the agent contract requires deterministic outputs given
//! the same collaborator responses).
//!
//! Calibration flags appended here:
//! - `low-sample` when the total poll sample is under the configured floor
//! - `wide-interval` when any party's p10–p90 band is wide relative to its
//!   seat mean

use super::Agent;
use crate::config::ForecastTuning;
use crate::context::{Dataset, PipelineStatus, ProjectContext};
use crate::error::AgentError;
use crate::forecast::{ForecastResult, PartyForecast, FLAG_LOW_SAMPLE, FLAG_WIDE_INTERVAL};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use statrs::distribution::ContinuousCDF;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Floor on the per-party share standard deviation; keeps the simulation
/// from collapsing when a poll series is nearly constant.
const MIN_SHARE_STD: f64 = 0.8;

/// Per-party share estimate pooled from the observation series.
struct ShareEstimate {
    party: String,
    mean: f64,
    std: f64,
}

pub struct ForecastAgent {
    tuning: ForecastTuning,
}

impl ForecastAgent {
    pub fn new(tuning: &ForecastTuning) -> Self {
        Self {
            tuning: tuning.clone(),
        }
    }

    fn seed_for(article_id: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        article_id.hash(&mut hasher);
        hasher.finish()
    }

    /// Sample-size-weighted mean and spread of each party's poll shares.
    fn estimate_shares(dataset: &Dataset) -> Vec<ShareEstimate> {
        dataset
            .parties()
            .into_iter()
            .map(|party| {
                let obs: Vec<_> = dataset
                    .observations
                    .iter()
                    .filter(|o| o.party == party)
                    .collect();
                let weight_total: f64 =
                    obs.iter().map(|o| f64::from(o.sample_size)).sum::<f64>().max(1.0);
                let mean = obs
                    .iter()
                    .map(|o| o.share * f64::from(o.sample_size))
                    .sum::<f64>()
                    / weight_total;
                let var = obs
                    .iter()
                    .map(|o| (o.share - mean).powi(2) * f64::from(o.sample_size))
                    .sum::<f64>()
                    / weight_total;
                ShareEstimate {
                    party,
                    mean,
                    std: var.sqrt().max(MIN_SHARE_STD),
                }
            })
            .collect()
    }

    fn build_targets(
        &self,
        estimates: &[ShareEstimate],
        rng: &mut StdRng,
    ) -> Result<Vec<PartyForecast>, AgentError> {
        let runs = self.tuning.simulation_runs as usize;
        let total_seats = f64::from(self.tuning.total_seats);
        let n = estimates.len();

        let samplers: Vec<Normal<f64>> = estimates
            .iter()
            .map(|e| Normal::new(e.mean, e.std))
            .collect::<Result<_, _>>()
            .map_err(|e| AgentError::Upstream(format!("invalid share estimate: {e}")))?;

        let mut seat_sum = vec![0.0f64; n];
        let mut seat_sq_sum = vec![0.0f64; n];
        let mut share_sum = vec![0.0f64; n];
        let mut share_sq_sum = vec![0.0f64; n];
        let mut wins = vec![0u32; n];

        let mut shares = vec![0.0f64; n];
        for _ in 0..runs {
            let mut total = 0.0;
            for (i, sampler) in samplers.iter().enumerate() {
                shares[i] = sampler.sample(rng).max(0.0);
                total += shares[i];
            }
            if total <= f64::EPSILON {
                continue;
            }

            // Normalization is monotone, so the raw-share argmax is the winner.
            let mut winner = 0;
            for i in 0..n {
                if shares[i] > shares[winner] {
                    winner = i;
                }
                let share = shares[i] / total * 100.0;
                let seats = share / 100.0 * total_seats;
                share_sum[i] += share;
                share_sq_sum[i] += share * share;
                seat_sum[i] += seats;
                seat_sq_sum[i] += seats * seats;
            }
            wins[winner] += 1;
        }

        let runs_f = runs as f64;
        let mut targets = Vec::with_capacity(n);
        for (i, estimate) in estimates.iter().enumerate() {
            let seat_mean = seat_sum[i] / runs_f;
            let seat_var = (seat_sq_sum[i] / runs_f - seat_mean * seat_mean).max(0.0);
            let seat_std = seat_var.sqrt();
            let share_mean = share_sum[i] / runs_f;
            let share_var = (share_sq_sum[i] / runs_f - share_mean * share_mean).max(0.0);
            let win_prob = f64::from(wins[i]) / runs_f;

            let (p10, p50, p90) = if seat_std > f64::EPSILON {
                let fitted = statrs::distribution::Normal::new(seat_mean, seat_std)
                    .map_err(|e| AgentError::Upstream(format!("quantile fit: {e}")))?;
                (
                    fitted.inverse_cdf(0.10),
                    fitted.inverse_cdf(0.50),
                    fitted.inverse_cdf(0.90),
                )
            } else {
                (seat_mean, seat_mean, seat_mean)
            };

            let target = PartyForecast::new(&estimate.party, seat_mean, seat_std, win_prob)?
                .with_vote_share(share_mean, share_var.sqrt())?
                .with_quantiles(p10, p50, p90)?;
            targets.push(target);
        }
        Ok(targets)
    }

    fn calibration_flags(&self, dataset: &Dataset, targets: &[PartyForecast]) -> Vec<String> {
        let mut flags = Vec::new();
        if dataset.total_sample_size() < self.tuning.low_sample_threshold {
            flags.push(FLAG_LOW_SAMPLE.to_string());
        }
        let wide = targets.iter().any(|t| {
            match (t.quantiles.get("p10"), t.quantiles.get("p90")) {
                (Some(p10), Some(p90)) => (p90 - p10) / t.seat_mean.max(1.0)
                    > self.tuning.wide_interval_ratio,
                _ => false,
            }
        });
        if wide {
            flags.push(FLAG_WIDE_INTERVAL.to_string());
        }
        flags
    }
}

#[async_trait]
impl Agent for ForecastAgent {
    fn name(&self) -> &'static str {
        "forecast"
    }

    fn requires(&self) -> PipelineStatus {
        PipelineStatus::DataDone
    }

    fn produces(&self) -> PipelineStatus {
        PipelineStatus::ForecastDone
    }

    async fn run(&self, mut ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        if ctx.forecast_spec.is_none() {
            return Err(AgentError::MissingInput("forecast_spec".to_string()));
        }
        let dataset = ctx
            .dataset
            .as_ref()
            .ok_or_else(|| AgentError::MissingInput("dataset".to_string()))?;

        let estimates = Self::estimate_shares(dataset);
        if estimates.is_empty() {
            return Err(AgentError::Upstream(
                "dataset contains no observations".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(Self::seed_for(&ctx.article_id));
        let targets = self.build_targets(&estimates, &mut rng)?;

        let mut result = ForecastResult::new(targets)?;
        result.metadata.insert(
            "simulation_runs".to_string(),
            serde_json::json!(self.tuning.simulation_runs),
        );
        result.metadata.insert(
            "total_sample".to_string(),
            serde_json::json!(dataset.total_sample_size()),
        );

        let flags = self.calibration_flags(dataset, &result.targets);

        debug!(
            article_id = %ctx.article_id,
            targets = result.targets.len(),
            flags = ?flags,
            "Forecast computed"
        );

        ctx.calibration_flags.extend(flags);
        ctx.forecast_result = Some(result);
        ctx.status = PipelineStatus::ForecastDone;
        Ok(ctx)
    }
}
