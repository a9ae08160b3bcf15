//! Foresight turns incoming news articles into published probabilistic
//! forecast projects.
//!
//! A [`pipeline::Orchestrator`] drives each article through a fixed roster
//! of agents (topic framing, data acquisition, forecasting, drafting,
//! criticism, governance, publication). Every stage is gated by the project
//! status machine in [`context::PipelineStatus`]; failures are retried with
//! exponential backoff, and drafts that draw serious editorial objections are
//! parked for human review instead of being published.

pub mod agents;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod forecast;
pub mod pipeline;
pub mod sink;
pub mod source;

pub use agents::{default_agents, Agent};
pub use backend::{DataBackend, SyntheticBackend};
pub use config::PipelineConfig;
pub use context::{PipelineStatus, ProjectContext};
pub use error::{AgentError, PipelineError};
pub use forecast::{DataInvariantError, ForecastResult, PartyForecast};
pub use pipeline::{Orchestrator, PipelineStats, RunError, RunOutcome};
pub use sink::{ContextSink, MemorySink, SledSink};
pub use source::{Article, ArticleSource, FileSource, SampleSource};
