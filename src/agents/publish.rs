//! Publish Agent — final project materialization.
//!
//! Assigns the project id, stamps the publication time, and assembles the
//! publishable payload from the accumulated sections, narrative, and
//! charts. The terminal handoff to the sink happens in the orchestrator,
//! not here.

use super::Agent;
use crate::context::{PipelineStatus, ProjectContext};
use crate::error::AgentError;
use async_trait::async_trait;
use tracing::info;

pub struct PublishAgent;

#[async_trait]
impl Agent for PublishAgent {
    fn name(&self) -> &'static str {
        "publish"
    }

    fn requires(&self) -> PipelineStatus {
        PipelineStatus::GovernanceDone
    }

    fn produces(&self) -> PipelineStatus {
        PipelineStatus::Published
    }

    async fn run(&self, mut ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        if ctx.project_id.is_none() {
            ctx.project_id = Some(uuid::Uuid::new_v4().to_string());
        }

        let headline = ctx
            .draft_sections
            .get("headline")
            .cloned()
            .or_else(|| ctx.origin_article.as_ref().map(|a| a.headline.clone()))
            .ok_or_else(|| AgentError::MissingInput("headline".to_string()))?;

        ctx.metadata.insert(
            "published_at".to_string(),
            serde_json::json!(chrono::Utc::now().to_rfc3339()),
        );
        ctx.metadata.insert(
            "publication".to_string(),
            serde_json::json!({
                "headline": headline,
                "narrative": &ctx.forecast_narrative,
                "sections": ctx.draft_sections.keys().collect::<Vec<_>>(),
                "charts": ctx.charts.len(),
                "methodology_included": !ctx.methodology.is_empty(),
            }),
        );

        info!(
            article_id = %ctx.article_id,
            project_id = ctx.project_id.as_deref().unwrap_or("-"),
            "Project published"
        );

        ctx.status = PipelineStatus::Published;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::sample_article;

    fn governance_done_ctx() -> ProjectContext {
        let mut ctx = ProjectContext::from_article(sample_article());
        ctx.draft_sections
            .insert("headline".to_string(), "Forecast: Unity ahead".to_string());
        ctx.forecast_narrative = "A narrow lead.".to_string();
        ctx.methodology = "Monte Carlo.".to_string();
        ctx.status = PipelineStatus::GovernanceDone;
        ctx
    }

    #[tokio::test]
    async fn test_materializes_project() {
        let out = PublishAgent.run(governance_done_ctx()).await.unwrap();
        assert_eq!(out.status, PipelineStatus::Published);
        assert!(out.project_id.is_some());
        assert!(out.metadata.contains_key("published_at"));

        let publication = &out.metadata["publication"];
        assert_eq!(publication["headline"], "Forecast: Unity ahead");
        assert_eq!(publication["methodology_included"], true);
    }

    #[tokio::test]
    async fn test_existing_project_id_preserved() {
        let mut ctx = governance_done_ctx();
        ctx.project_id = Some("proj-keep".to_string());
        let out = PublishAgent.run(ctx).await.unwrap();
        assert_eq!(out.project_id.as_deref(), Some("proj-keep"));
    }

    #[tokio::test]
    async fn test_falls_back_to_article_headline() {
        let mut ctx = governance_done_ctx();
        ctx.draft_sections.remove("headline");
        let out = PublishAgent.run(ctx).await.unwrap();
        let publication = &out.metadata["publication"];
        assert_eq!(
            publication["headline"],
            "Unity Party edges ahead as election race tightens"
        );
    }
}
