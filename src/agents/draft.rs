//! Draft Agent — narrative and section rendering.
//!
//! Renders the forecast narrative and the named draft sections from the
//! validated forecast result. The result is trusted input here: this stage
//! never re-derives probabilities, only words them.

use super::Agent;
use crate::context::{PipelineStatus, ProjectContext};
use crate::error::AgentError;
use crate::forecast::{ForecastResult, PartyForecast, FLAG_WIDE_INTERVAL};
use async_trait::async_trait;
use tracing::debug;

pub struct DraftAgent;

impl DraftAgent {
    /// Editorial wording for a win probability. Deliberately hedged — the
    /// critic stage flags certainty language against sub-0.95 probabilities.
    fn favour_phrase(win_prob: f64) -> &'static str {
        if win_prob >= 0.9 {
            "overwhelmingly favoured"
        } else if win_prob >= 0.7 {
            "clearly favoured"
        } else if win_prob >= 0.55 {
            "narrowly favoured"
        } else {
            "in a toss-up"
        }
    }

    fn seat_range(target: &PartyForecast) -> String {
        match (target.quantiles.get("p10"), target.quantiles.get("p90")) {
            (Some(p10), Some(p90)) => {
                format!("between {:.0} and {:.0} seats", p10, p90)
            }
            _ => format!("around {:.0} seats", target.seat_mean),
        }
    }

    fn narrative(result: &ForecastResult, favourite: &PartyForecast) -> String {
        format!(
            "The {} is {} with a {:.0}% chance of winning the most seats, \
             projected at {} (central estimate {:.0}).",
            favourite.party,
            Self::favour_phrase(favourite.win_prob),
            favourite.win_prob * 100.0,
            Self::seat_range(favourite),
            favourite
                .quantiles
                .get("p50")
                .copied()
                .unwrap_or(favourite.seat_mean),
        ) + &format!(" Model: {}.", result.model_name)
    }
}

#[async_trait]
impl Agent for DraftAgent {
    fn name(&self) -> &'static str {
        "draft"
    }

    fn requires(&self) -> PipelineStatus {
        PipelineStatus::ForecastDone
    }

    fn produces(&self) -> PipelineStatus {
        PipelineStatus::DraftDone
    }

    async fn run(&self, mut ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        let result = ctx
            .forecast_result
            .as_ref()
            .ok_or_else(|| AgentError::MissingInput("forecast_result".to_string()))?;
        let favourite = result
            .favourite()
            .ok_or_else(|| AgentError::MissingInput("forecast_result.targets".to_string()))?;

        let narrative = Self::narrative(result, favourite);

        let headline = format!(
            "Forecast: {} {} ahead of the vote",
            favourite.party,
            Self::favour_phrase(favourite.win_prob)
        );
        let lede = format!(
            "Our latest model run puts the {} at a {:.0}% chance of taking the \
             most seats, {}.",
            favourite.party,
            favourite.win_prob * 100.0,
            Self::seat_range(favourite)
        );

        let mut analysis = String::new();
        for target in &result.targets {
            analysis.push_str(&format!(
                "{}: {:.0} seats expected ({}), win probability {:.0}%.\n",
                target.party,
                target.seat_mean,
                Self::seat_range(target),
                target.win_prob * 100.0
            ));
        }

        let outlook = if ctx.calibration_flags.iter().any(|f| f == FLAG_WIDE_INTERVAL) {
            "The projection carries wide uncertainty bands; the range of \
             plausible outcomes spans well beyond the central estimate."
                .to_string()
        } else {
            "The projection is comparatively stable across recent polling, \
             though late swings remain possible."
                .to_string()
        };

        ctx.draft_sections.insert("headline".to_string(), headline);
        ctx.draft_sections.insert("lede".to_string(), lede);
        ctx.draft_sections.insert("analysis".to_string(), analysis);
        ctx.draft_sections.insert("outlook".to_string(), outlook);
        ctx.forecast_narrative = narrative;

        debug!(
            article_id = %ctx.article_id,
            sections = ctx.draft_sections.len(),
            "Draft rendered"
        );

        ctx.status = PipelineStatus::DraftDone;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{ForecastResult, PartyForecast};
    use crate::source::sample_article;

    fn forecast_done_ctx() -> ProjectContext {
        let mut ctx = ProjectContext::from_article(sample_article());
        let a = PartyForecast::new("Unity Party", 310.0, 12.0, 0.62)
            .unwrap()
            .with_quantiles(294.0, 310.0, 326.0)
            .unwrap();
        let b = PartyForecast::new("Heritage Party", 280.0, 12.0, 0.38)
            .unwrap()
            .with_quantiles(264.0, 280.0, 296.0)
            .unwrap();
        ctx.forecast_result = Some(ForecastResult::new(vec![a, b]).unwrap());
        ctx.status = PipelineStatus::ForecastDone;
        ctx
    }

    #[tokio::test]
    async fn test_renders_all_sections() {
        let out = DraftAgent.run(forecast_done_ctx()).await.unwrap();
        assert_eq!(out.status, PipelineStatus::DraftDone);
        for section in ["headline", "lede", "analysis", "outlook"] {
            assert!(out.draft_sections.contains_key(section), "missing {section}");
        }
        assert!(out.forecast_narrative.contains("Unity Party"));
        assert!(out.forecast_narrative.contains("62%"));
    }

    #[tokio::test]
    async fn test_narrative_includes_range_language() {
        let out = DraftAgent.run(forecast_done_ctx()).await.unwrap();
        assert!(out.forecast_narrative.contains("between"));
    }

    #[tokio::test]
    async fn test_missing_result_is_agent_error() {
        let mut ctx = forecast_done_ctx();
        ctx.forecast_result = None;
        let err = DraftAgent.run(ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingInput(_)));
    }

    #[test]
    fn test_favour_phrases() {
        assert_eq!(DraftAgent::favour_phrase(0.95), "overwhelmingly favoured");
        assert_eq!(DraftAgent::favour_phrase(0.75), "clearly favoured");
        assert_eq!(DraftAgent::favour_phrase(0.6), "narrowly favoured");
        assert_eq!(DraftAgent::favour_phrase(0.5), "in a toss-up");
    }
}
