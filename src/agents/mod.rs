//! Pipeline stage agents.
//!
//! Each agent is one stage: it consumes a `ProjectContext`, populates the
//! fields its stage owns, advances the status to its declared
//! postcondition, and returns the context (or fails with an
//! [`AgentError`]). Agents never call each other — composition belongs
//! solely to the orchestrator.
//!
//! ## Stage roster (declared order)
//!
//! 1. **Topic Agent** (`ingested → topic_done`): topic classification and
//!    entity extraction
//! 2. **Data Agent** (`topic_done → data_done`): forecast spec design and
//!    dataset attachment via the data backend
//! 3. **Forecast Agent** (`data_done → forecast_done`): Monte Carlo seat
//!    simulation, win probabilities, quantiles, calibration flags
//! 4. **Draft Agent** (`forecast_done → draft_done`): narrative and draft
//!    sections
//! 5. **Critic Agent** (`draft_done → critic_done`): editorial issues;
//!    this is the review-gate stage
//! 6. **Governance Agent** (`critic_done → governance_done`): methodology
//!    and charts
//! 7. **Publish Agent** (`governance_done → published`): project
//!    materialization

pub mod topic;
pub mod data;
pub mod forecast;
pub mod draft;
pub mod critic;
pub mod governance;
pub mod publish;

pub use topic::TopicAgent;
pub use data::DataAgent;
pub use forecast::ForecastAgent;
pub use draft::DraftAgent;
pub use critic::CriticAgent;
pub use governance::GovernanceAgent;
pub use publish::PublishAgent;

use crate::backend::DataBackend;
use crate::config::ForecastTuning;
use crate::context::{PipelineStatus, ProjectContext};
use crate::error::AgentError;
use async_trait::async_trait;
use std::sync::Arc;

/// One pipeline stage.
///
/// Contract:
/// - the input context satisfies `requires()` (the orchestrator enforces
///   this before invocation);
/// - on success the returned context's status equals `produces()` and the
///   stage's own fields are populated;
/// - on failure nothing leaks: the agent consumed its copy, and the
///   orchestrator retries from its own pre-stage snapshot;
/// - given the same context and the same collaborator responses, the
///   declared output fields are deterministic functions of the input.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stage name for logging and error diagnostics.
    fn name(&self) -> &'static str;

    /// Precondition: the status the context must be at.
    fn requires(&self) -> PipelineStatus;

    /// Postcondition: the status the returned context must be at.
    fn produces(&self) -> PipelineStatus;

    /// Execute the stage.
    async fn run(&self, ctx: ProjectContext) -> Result<ProjectContext, AgentError>;
}

/// The default seven-stage roster in declared order.
pub fn default_agents(
    backend: Arc<dyn DataBackend>,
    tuning: &ForecastTuning,
) -> Vec<Box<dyn Agent>> {
    vec![
        Box::new(TopicAgent::new()),
        Box::new(DataAgent::new(backend)),
        Box::new(ForecastAgent::new(tuning)),
        Box::new(DraftAgent),
        Box::new(CriticAgent::new()),
        Box::new(GovernanceAgent),
        Box::new(PublishAgent),
    ]
}
