//! Critic Agent — editorial review of the drafted forecast story.
//!
//! Scans the draft sections and narrative for editorial problems and
//! appends them to `critic_issues`. This is the review-gate stage: the
//! orchestrator routes the run to `pending_review` when issues at or above
//! the configured severity threshold remain after this stage.
//!
//! The critic only raises issues — deciding whether they block is the
//! orchestrator's job.

use super::Agent;
use crate::context::{CriticIssue, IssueSeverity, PipelineStatus, ProjectContext};
use crate::error::AgentError;
use crate::forecast::FLAG_WIDE_INTERVAL;
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

/// Win probability above which certainty language stops being an issue.
const CERTAINTY_TOLERANCE: f64 = 0.95;

/// Minimum lede length; anything shorter reads as a stub.
const MIN_LEDE_CHARS: usize = 40;

pub struct CriticAgent {
    certainty_re: Regex,
}

impl CriticAgent {
    // Static pattern, exercised by the tests below.
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            certainty_re: Regex::new(
                r"(?i)\b(will win|is certain|guaranteed|inevitable|cannot lose|sure to win)\b",
            )
            .expect("static certainty pattern"),
        }
    }

    fn review(&self, ctx: &ProjectContext) -> Vec<CriticIssue> {
        let mut issues = Vec::new();

        let favourite_prob = ctx
            .forecast_result
            .as_ref()
            .and_then(|r| r.favourite())
            .map_or(0.0, |t| t.win_prob);

        // Certainty language against a probabilistic forecast
        if favourite_prob < CERTAINTY_TOLERANCE {
            for (section, text) in &ctx.draft_sections {
                if let Some(m) = self.certainty_re.find(text) {
                    issues.push(CriticIssue {
                        severity: IssueSeverity::High,
                        message: format!(
                            "certainty language '{}' with win probability {:.0}%",
                            m.as_str(),
                            favourite_prob * 100.0
                        ),
                        location: section.clone(),
                    });
                }
            }
        }

        // A wide-interval forecast must communicate its range
        if ctx.calibration_flags.iter().any(|f| f == FLAG_WIDE_INTERVAL)
            && !ctx.forecast_narrative.contains("between")
            && !ctx.forecast_narrative.contains("range")
        {
            issues.push(CriticIssue {
                severity: IssueSeverity::Medium,
                message: "wide-interval forecast but narrative carries no range language"
                    .to_string(),
                location: "forecast_narrative".to_string(),
            });
        }

        // Stub lede
        if ctx
            .draft_sections
            .get("lede")
            .is_some_and(|lede| lede.len() < MIN_LEDE_CHARS)
        {
            issues.push(CriticIssue {
                severity: IssueSeverity::Low,
                message: format!("lede shorter than {MIN_LEDE_CHARS} characters"),
                location: "lede".to_string(),
            });
        }

        issues
    }
}

impl Default for CriticAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for CriticAgent {
    fn name(&self) -> &'static str {
        "critic"
    }

    fn requires(&self) -> PipelineStatus {
        PipelineStatus::DraftDone
    }

    fn produces(&self) -> PipelineStatus {
        PipelineStatus::CriticDone
    }

    async fn run(&self, mut ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        let issues = self.review(&ctx);

        debug!(
            article_id = %ctx.article_id,
            raised = issues.len(),
            "Editorial critique complete"
        );

        ctx.critic_issues.extend(issues);
        ctx.status = PipelineStatus::CriticDone;
        Ok(ctx)
    }
}
