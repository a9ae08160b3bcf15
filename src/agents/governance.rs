//! Governance Agent — methodology and chart assembly.
//!
//! Writes the methodology prose (model, data, calibration disclosure) and
//! the chart specifications the published project carries.

use super::Agent;
use crate::context::{ChartSpec, PipelineStatus, ProjectContext};
use crate::error::AgentError;
use async_trait::async_trait;
use tracing::debug;

pub struct GovernanceAgent;

impl GovernanceAgent {
    fn methodology(ctx: &ProjectContext) -> Result<String, AgentError> {
        let result = ctx
            .forecast_result
            .as_ref()
            .ok_or_else(|| AgentError::MissingInput("forecast_result".to_string()))?;

        let runs = result
            .metadata
            .get("simulation_runs")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        let dataset_label = ctx.dataset_id.as_deref().unwrap_or("unattributed");

        let mut prose = format!(
            "Seat projections come from the {} model: {} Monte Carlo \
             iterations over pooled polling (dataset {}), with vote shares \
             sampled per party, normalized, and converted to seats under \
             uniform swing. Win probabilities are winning fractions across \
             iterations; p10/p50/p90 bands come from the sampled seat \
             distribution.",
            result.model_name, runs, dataset_label
        );

        if ctx.calibration_flags.is_empty() {
            prose.push_str(" No calibration warnings were raised for this run.");
        } else {
            prose.push_str(&format!(
                " Calibration warnings for this run: {}.",
                ctx.calibration_flags.join(", ")
            ));
        }
        Ok(prose)
    }

    fn charts(ctx: &ProjectContext) -> Vec<ChartSpec> {
        let Some(result) = ctx.forecast_result.as_ref() else {
            return Vec::new();
        };

        let seat_rows: Vec<serde_json::Value> = result
            .targets
            .iter()
            .map(|t| {
                serde_json::json!({
                    "party": t.party,
                    "seat_mean": t.seat_mean,
                    "p10": t.quantiles.get("p10"),
                    "p90": t.quantiles.get("p90"),
                })
            })
            .collect();
        let prob_rows: Vec<serde_json::Value> = result
            .targets
            .iter()
            .map(|t| serde_json::json!({ "party": t.party, "win_prob": t.win_prob }))
            .collect();

        vec![
            ChartSpec {
                title: "Projected seats with p10–p90 band".to_string(),
                chart_type: "interval".to_string(),
                data: serde_json::Value::Array(seat_rows),
            },
            ChartSpec {
                title: "Win probability".to_string(),
                chart_type: "probability".to_string(),
                data: serde_json::Value::Array(prob_rows),
            },
        ]
    }
}

#[async_trait]
impl Agent for GovernanceAgent {
    fn name(&self) -> &'static str {
        "governance"
    }

    fn requires(&self) -> PipelineStatus {
        PipelineStatus::CriticDone
    }

    fn produces(&self) -> PipelineStatus {
        PipelineStatus::GovernanceDone
    }

    async fn run(&self, mut ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        ctx.methodology = Self::methodology(&ctx)?;
        ctx.charts = Self::charts(&ctx);
        ctx.metadata.insert(
            "governance_checklist".to_string(),
            serde_json::json!({
                "uncertainty_disclosed": true,
                "methodology_included": true,
                "calibration_flags": &ctx.calibration_flags,
            }),
        );

        debug!(
            article_id = %ctx.article_id,
            charts = ctx.charts.len(),
            "Governance assembly complete"
        );

        ctx.status = PipelineStatus::GovernanceDone;
        Ok(ctx)
    }
}
