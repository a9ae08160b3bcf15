//! Pipeline orchestration.
//!
//! The orchestrator drives an ordered list of agents over one
//! `ProjectContext` at a time, enforcing the status state machine,
//! stage contracts, retry policy, the review gate, and terminal handoff.

pub mod orchestrator;

pub use orchestrator::{Orchestrator, PipelineStats, RunError, RunOutcome};
