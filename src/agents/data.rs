//! Data Agent — forecast spec design and dataset attachment.
//!
//! Designs what to forecast from the classified topic and extracted
//! entities, then pulls the backing dataset from the data backend. Empty
//! entity lists are valid: the backend falls back to topic defaults.

use super::Agent;
use crate::backend::DataBackend;
use crate::context::{ForecastSpec, PipelineStatus, ProjectContext};
use crate::error::AgentError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Column schema of the attached dataset, recorded for downstream stages.
const DATA_TEMPLATE: &str = "party,share,sample_size,observed_at";

pub struct DataAgent {
    backend: Arc<dyn DataBackend>,
}

impl DataAgent {
    pub fn new(backend: Arc<dyn DataBackend>) -> Self {
        Self { backend }
    }

    fn design_spec(ctx: &ProjectContext) -> ForecastSpec {
        let parties: Vec<&str> = ctx
            .entities
            .iter()
            .filter(|e| e.entity_type == "party")
            .map(|e| e.name.as_str())
            .collect();

        let target = if parties.is_empty() {
            format!("National seat share ({})", ctx.topic)
        } else {
            format!("National seat share: {}", parties.join(" vs "))
        };

        ForecastSpec {
            target,
            horizon: "next election date".to_string(),
            granularity: "national".to_string(),
            constraints: ForecastSpec::default_constraints(),
            topic: ctx.topic.clone(),
        }
    }
}

#[async_trait]
impl Agent for DataAgent {
    fn name(&self) -> &'static str {
        "data"
    }

    fn requires(&self) -> PipelineStatus {
        PipelineStatus::TopicDone
    }

    fn produces(&self) -> PipelineStatus {
        PipelineStatus::DataDone
    }

    async fn run(&self, mut ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        let spec = Self::design_spec(&ctx);

        let dataset = self
            .backend
            .fetch_dataset(&spec, &ctx.entities)
            .await
            .map_err(|e| AgentError::Upstream(e.to_string()))?;

        debug!(
            article_id = %ctx.article_id,
            backend = self.backend.backend_name(),
            observations = dataset.observations.len(),
            target = %spec.target,
            "Dataset attached"
        );

        ctx.dataset_id = Some(format!("ds-{}", ctx.article_id));
        ctx.data_template = DATA_TEMPLATE.to_string();
        ctx.dataset = Some(dataset);
        ctx.forecast_spec = Some(spec);
        ctx.status = PipelineStatus::DataDone;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailingBackend, SyntheticBackend};
    use crate::context::Entity;
    use crate::source::sample_article;

    fn topic_done_ctx() -> ProjectContext {
        let mut ctx = ProjectContext::from_article(sample_article());
        ctx.topic = "politics".to_string();
        ctx.status = PipelineStatus::TopicDone;
        ctx
    }

    #[tokio::test]
    async fn test_attaches_spec_and_dataset() {
        let agent = DataAgent::new(Arc::new(SyntheticBackend));
        let mut ctx = topic_done_ctx();
        ctx.entities.push(Entity::new("party", "Unity Party"));
        ctx.entities.push(Entity::new("party", "Heritage Party"));

        let out = agent.run(ctx).await.unwrap();
        assert_eq!(out.status, PipelineStatus::DataDone);

        let spec = out.forecast_spec.unwrap();
        assert!(spec.target.contains("Unity Party"));
        assert_eq!(spec.topic, "politics");
        assert!(spec.constraints.contains_key("probabilistic"));

        assert_eq!(out.dataset_id.as_deref(), Some("ds-sample-001"));
        assert_eq!(out.data_template, DATA_TEMPLATE);
        assert!(!out.dataset.unwrap().observations.is_empty());
    }

    #[tokio::test]
    async fn test_empty_entities_still_valid() {
        let agent = DataAgent::new(Arc::new(SyntheticBackend));
        let out = agent.run(topic_done_ctx()).await.unwrap();
        assert_eq!(out.status, PipelineStatus::DataDone);
        assert!(!out.dataset.unwrap().observations.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_upstream_error() {
        let agent = DataAgent::new(Arc::new(FailingBackend));
        let err = agent.run(topic_done_ctx()).await.unwrap_err();
        assert!(matches!(err, AgentError::Upstream(_)));
    }
}
