//! Pipeline error taxonomy
//!
//! Three fatality classes, matching how the orchestrator reacts:
//! - `Sequence` / `ContractViolation` / `DataInvariant`: defects in agent
//!   ordering or agent output. Never retried, surfaced to the caller with
//!   full diagnostics, context left unadvanced.
//! - `AgentFailed`: transient agent processing failure, absorbed by the
//!   retry loop and only escalated after exhaustion; the run terminates
//!   `failed` and is still persisted.
//! - `Cancelled` / `Start`: run-boundary conditions (cooperative cancel,
//!   source fetch failure before the run begins).
//!
//! A review hold is deliberately NOT an error — see
//! [`RunOutcome::PendingReview`](crate::pipeline::RunOutcome).

use crate::context::PipelineStatus;
use crate::forecast::DataInvariantError;
use crate::source::SourceError;

// ============================================================================
// Agent-side errors
// ============================================================================

/// Failure signalled by an agent's own processing.
///
/// `Upstream` and `MissingInput` are retryable per the orchestrator's
/// policy. `Invariant` is not: a numeric invariant violation is a defect in
/// the producing stage, escalated immediately as [`PipelineError::DataInvariant`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// An external collaborator (data backend, LLM, fetch) failed
    #[error("upstream collaborator error: {0}")]
    Upstream(String),

    /// A field this stage depends on is missing from the context
    #[error("missing input: {0}")]
    MissingInput(String),

    /// A produced forecast result violates a numeric invariant
    #[error(transparent)]
    Invariant(#[from] DataInvariantError),
}

impl AgentError {
    /// Whether the orchestrator's retry policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Invariant(_))
    }
}

// ============================================================================
// Orchestrator-level errors
// ============================================================================

/// Error surfaced by a pipeline run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// An agent was invoked against a context that does not satisfy its
    /// declared precondition. Programmer error in the stage ordering.
    #[error("sequence error: agent '{agent}' requires status '{expected}', context is at '{actual}'")]
    Sequence {
        agent: String,
        expected: PipelineStatus,
        actual: PipelineStatus,
    },

    /// An agent returned a context violating its declared postcondition or
    /// a data-flow invariant.
    #[error("contract violation in agent '{agent}': {detail}")]
    ContractViolation { agent: String, detail: String },

    /// A produced forecast result violates a numeric invariant. Same
    /// fatality class as a contract violation.
    #[error("data invariant violated in agent '{agent}': {source}")]
    DataInvariant {
        agent: String,
        #[source]
        source: DataInvariantError,
    },

    /// An agent's processing failed and the retry policy is exhausted.
    #[error("agent '{agent}' failed after {attempts} attempt(s): {last_error}")]
    AgentFailed {
        agent: String,
        attempts: u32,
        last_error: String,
    },

    /// The run was cancelled at a stage boundary.
    #[error("run cancelled before stage '{agent}'")]
    Cancelled { agent: String },

    /// Source-article fetch failed; the run never began.
    #[error("run start failed: {0}")]
    Start(#[from] SourceError),
}

impl PipelineError {
    /// Whether this error indicates a defect (bad wiring or bad agent
    /// output) rather than a transient runtime failure.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::Sequence { .. } | Self::ContractViolation { .. } | Self::DataInvariant { .. }
        )
    }
}
