//! Orchestrator — sequenced agent execution over one ProjectContext.
//!
//! The processing sequence for one article:
//!
//! ```text
//! ingested → topic_done → data_done → forecast_done → draft_done
//!          → critic_done → governance_done → published
//! ```
//!
//! with `failed` and `pending_review` reachable from any non-terminal
//! state. For each registered stage, in declared order:
//!
//! 1. Check the cancellation token at the stage boundary.
//! 2. Verify the context status equals the stage precondition —
//!    mismatch is a `SequenceError` (configuration defect, not retried).
//! 3. Invoke the agent under the per-agent time budget. Failures and
//!    timeouts retry with exponential backoff up to the configured bound;
//!    exhaustion terminates the run `failed` with the last error recorded.
//! 4. Assert the returned status equals the stage postcondition, the
//!    calibration flags were only appended to, and the forecast-result
//!    presence rule holds — violations are fatal and leave the context at
//!    its pre-stage state.
//! 5. After the forecast stage, re-validate the result numerically before
//!    the context advances.
//! 6. After the critic stage, route to `pending_review` when blocking
//!    issues remain; `resume()` re-enters at `critic_done` once a reviewer
//!    clears them.
//!
//! GUARANTEE: stage effects apply in declared order for a single context —
//! no reordering, no skipping, and retries re-invoke the same agent
//! against the same pre-stage snapshot.
//!
//! Many independent contexts may run concurrently through one shared
//! orchestrator; per-run state is owned by that run's task for its
//! lifetime.

use crate::agents::Agent;
use crate::config::PipelineConfig;
use crate::context::{PipelineStatus, ProjectContext};
use crate::error::{AgentError, PipelineError};
use crate::forecast::DataInvariantError;
use crate::sink::{ContextSink, ReviewNotifier};
use crate::source::ArticleSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// ============================================================================
// Outcomes
// ============================================================================

/// How a pipeline run ended. All three outcomes are handed to the sink
/// before being returned.
#[derive(Debug)]
pub enum RunOutcome {
    /// Full success; context is at `published`
    Published(ProjectContext),
    /// Halted at the review gate; context is at `pending_review` and the
    /// review notifier has fired. Not an error — resume with
    /// [`Orchestrator::resume`] once a reviewer clears the issues.
    PendingReview(ProjectContext),
    /// Retry exhaustion or cancellation; context is at `failed` with the
    /// triggering error recorded in its metadata
    Failed {
        context: ProjectContext,
        error: PipelineError,
    },
}

impl RunOutcome {
    /// Terminal context regardless of outcome.
    pub fn context(&self) -> &ProjectContext {
        match self {
            Self::Published(ctx) | Self::PendingReview(ctx) => ctx,
            Self::Failed { context, .. } => context,
        }
    }
}

/// A defect-class failure: sequence error, contract violation, or data
/// invariant violation. Carries the context at its last valid (pre-stage)
/// state so callers can inspect where the pipeline stopped.
#[derive(Debug)]
pub struct RunError {
    pub error: PipelineError,
    pub context: ProjectContext,
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Cumulative counters across all runs of one orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub runs_started: u64,
    pub published: u64,
    pub failed: u64,
    pub held_for_review: u64,
    pub retries: u64,
}

#[derive(Default)]
struct Counters {
    runs_started: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
    held_for_review: AtomicU64,
    retries: AtomicU64,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives the registered agent roster over contexts.
///
/// Shared across concurrent runs via `Arc`; holds only read-only
/// configuration and atomic counters, never per-run state.
pub struct Orchestrator {
    stages: Vec<Box<dyn Agent>>,
    config: PipelineConfig,
    sink: Arc<dyn ContextSink>,
    notifier: Arc<dyn ReviewNotifier>,
    counters: Counters,
}

impl Orchestrator {
    /// Build an orchestrator over an explicit, ordered agent roster.
    ///
    /// Configuration is passed in here — there is no ambient global. Stage
    /// wiring is not validated eagerly; a roster whose preconditions do not
    /// chain surfaces as a `SequenceError` on the first affected run.
    pub fn new(
        stages: Vec<Box<dyn Agent>>,
        config: PipelineConfig,
        sink: Arc<dyn ContextSink>,
        notifier: Arc<dyn ReviewNotifier>,
    ) -> Self {
        info!(
            stages = stages.len(),
            sink = sink.sink_name(),
            max_attempts = config.retry.max_attempts,
            "Orchestrator initialized"
        );
        Self {
            stages,
            config,
            sink,
            notifier,
            counters: Counters::default(),
        }
    }

    /// Fetch an article and run a fresh context through the pipeline.
    ///
    /// Supplier failures map to [`PipelineError::Start`]: the run never
    /// begins and nothing is persisted.
    pub async fn run_article(
        &self,
        source: &dyn ArticleSource,
        article_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let article = match source.fetch(article_id).await {
            Ok(article) => article,
            Err(e) => {
                error!(article_id, source = source.source_name(), error = %e, "Run start failed");
                return Err(RunError {
                    error: PipelineError::Start(e),
                    // A context that never started: empty record at ingested
                    context: ProjectContext::from_article(crate::source::Article {
                        id: article_id.to_string(),
                        headline: String::new(),
                        body: String::new(),
                        source: source.source_name().to_string(),
                        published_at: chrono::Utc::now(),
                    }),
                });
            }
        };
        self.run(ProjectContext::from_article(article), cancel).await
    }

    /// Run a context through the pipeline from its current status.
    ///
    /// Returns `Ok` for the three normal outcomes (published, held,
    /// failed — all persisted) and `Err` for defect-class errors, which
    /// leave the context unadvanced and unpersisted for the caller to
    /// inspect.
    pub async fn run(
        &self,
        ctx: ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        self.counters.runs_started.fetch_add(1, Ordering::Relaxed);
        self.drive(ctx, cancel).await
    }

    /// Re-enter a run held at the review gate.
    ///
    /// Requires `pending_review` with the blocking issues cleared (an
    /// external reviewer resolves or downgrades them). The context
    /// re-enters at `critic_done` and proceeds to publication.
    pub async fn resume(
        &self,
        mut ctx: ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        if ctx.status != PipelineStatus::PendingReview {
            return Err(RunError {
                error: PipelineError::Sequence {
                    agent: "resume".to_string(),
                    expected: PipelineStatus::PendingReview,
                    actual: ctx.status,
                },
                context: ctx,
            });
        }
        let blocking = ctx
            .blocking_issues(self.config.review.severity_threshold)
            .len();
        if blocking > 0 {
            return Err(RunError {
                error: PipelineError::ContractViolation {
                    agent: "resume".to_string(),
                    detail: format!(
                        "{blocking} issue(s) at or above '{}' still unresolved",
                        self.config.review.severity_threshold
                    ),
                },
                context: ctx,
            });
        }

        info!(article_id = %ctx.article_id, "Resuming run after review");
        ctx.status = PipelineStatus::CriticDone;
        self.drive(ctx, cancel).await
    }

    /// Snapshot of the cumulative counters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            runs_started: self.counters.runs_started.load(Ordering::Relaxed),
            published: self.counters.published.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            held_for_review: self.counters.held_for_review.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------------
    // Core loop
    // ------------------------------------------------------------------

    async fn drive(
        &self,
        mut ctx: ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let Some(start) = self
            .stages
            .iter()
            .position(|s| s.requires() == ctx.status)
        else {
            if ctx.status == PipelineStatus::Published {
                // Already terminal; re-deliver to the sink (idempotent)
                self.persist(&ctx);
                return Ok(RunOutcome::Published(ctx));
            }
            let actual = ctx.status;
            return Err(RunError {
                error: PipelineError::Sequence {
                    agent: "<roster>".to_string(),
                    expected: self
                        .stages
                        .first()
                        .map_or(PipelineStatus::Ingested, |s| s.requires()),
                    actual,
                },
                context: ctx,
            });
        };

        for stage in &self.stages[start..] {
            if cancel.is_cancelled() {
                let err = PipelineError::Cancelled {
                    agent: stage.name().to_string(),
                };
                warn!(article_id = %ctx.article_id, stage = stage.name(), "Run cancelled");
                ctx.mark_failed("cancelled");
                self.persist(&ctx);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return Ok(RunOutcome::Failed { context: ctx, error: err });
            }

            // Precondition (fail fast, context untouched)
            if ctx.status != stage.requires() {
                return Err(RunError {
                    error: PipelineError::Sequence {
                        agent: stage.name().to_string(),
                        expected: stage.requires(),
                        actual: ctx.status,
                    },
                    context: ctx,
                });
            }

            ctx = match self.invoke_with_retry(stage.as_ref(), ctx).await? {
                StageResult::Advanced(next) => next,
                StageResult::Exhausted { context, error } => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    self.persist(&context);
                    return Ok(RunOutcome::Failed { context, error });
                }
            };

            // Review gate after the critic stage
            if stage.produces() == PipelineStatus::CriticDone {
                let blocking = ctx
                    .blocking_issues(self.config.review.severity_threshold)
                    .into_iter()
                    .cloned()
                    .collect::<Vec<_>>();
                if !blocking.is_empty() {
                    ctx.status = PipelineStatus::PendingReview;
                    self.notifier.notify(&ctx, &blocking);
                    self.persist(&ctx);
                    self.counters.held_for_review.fetch_add(1, Ordering::Relaxed);
                    return Ok(RunOutcome::PendingReview(ctx));
                }
            }
        }

        if ctx.status != PipelineStatus::Published {
            // Roster ended early: wiring defect
            let actual = ctx.status;
            return Err(RunError {
                error: PipelineError::ContractViolation {
                    agent: "<roster>".to_string(),
                    detail: format!("roster exhausted at '{actual}', not 'published'"),
                },
                context: ctx,
            });
        }

        self.persist(&ctx);
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        info!(
            article_id = %ctx.article_id,
            project_id = ctx.project_id.as_deref().unwrap_or("-"),
            "Run complete"
        );
        Ok(RunOutcome::Published(ctx))
    }

    /// Invoke one stage with timeout and bounded retries.
    ///
    /// Every attempt runs against a clone of the pre-stage context, so a
    /// failed attempt cannot leak partial writes into the next one.
    async fn invoke_with_retry(
        &self,
        stage: &dyn Agent,
        pre: ProjectContext,
    ) -> Result<StageResult, RunError> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let budget = self.config.timeouts.agent_budget();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let outcome = tokio::time::timeout(budget, stage.run(pre.clone())).await;

            match outcome {
                Ok(Ok(next)) => {
                    if let Err(error) = self.check_postconditions(stage, &pre, &next) {
                        // Fatal: surface with the context at its pre-stage state
                        error!(
                            article_id = %pre.article_id,
                            stage = stage.name(),
                            error = %error,
                            "Stage contract violated"
                        );
                        return Err(RunError { error, context: pre });
                    }
                    return Ok(StageResult::Advanced(next));
                }
                Ok(Err(agent_err)) => {
                    if !agent_err.is_retryable() {
                        let error = escalate(stage.name(), agent_err);
                        error!(
                            article_id = %pre.article_id,
                            stage = stage.name(),
                            error = %error,
                            "Stage raised a non-retryable error"
                        );
                        return Err(RunError { error, context: pre });
                    }
                    last_error = agent_err.to_string();
                }
                Err(_elapsed) => {
                    last_error = format!("timed out after {}s", budget.as_secs());
                }
            }

            warn!(
                article_id = %pre.article_id,
                stage = stage.name(),
                attempt,
                max_attempts,
                error = %last_error,
                "Stage attempt failed"
            );

            if attempt < max_attempts {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(self.config.retry.backoff_after(attempt)).await;
            }
        }

        let error = PipelineError::AgentFailed {
            agent: stage.name().to_string(),
            attempts: max_attempts,
            last_error: last_error.clone(),
        };
        let mut context = pre;
        context.mark_failed(&error.to_string());
        Ok(StageResult::Exhausted { context, error })
    }

    /// Stage postcondition and data-flow invariant checks.
    fn check_postconditions(
        &self,
        stage: &dyn Agent,
        pre: &ProjectContext,
        next: &ProjectContext,
    ) -> Result<(), PipelineError> {
        if next.status != stage.produces() {
            return Err(PipelineError::ContractViolation {
                agent: stage.name().to_string(),
                detail: format!(
                    "expected status '{}', returned '{}'",
                    stage.produces(),
                    next.status
                ),
            });
        }

        // Calibration flags are append-only within a run
        if !next.calibration_flags.starts_with(&pre.calibration_flags) {
            return Err(PipelineError::ContractViolation {
                agent: stage.name().to_string(),
                detail: "calibration_flags were cleared or reordered".to_string(),
            });
        }

        // forecast_result populated iff at or past forecast_done
        let should_have_result = next.status.at_or_past(PipelineStatus::ForecastDone);
        if next.forecast_result.is_some() != should_have_result {
            return Err(PipelineError::ContractViolation {
                agent: stage.name().to_string(),
                detail: format!(
                    "forecast_result {} at status '{}'",
                    if next.forecast_result.is_some() { "present" } else { "missing" },
                    next.status
                ),
            });
        }

        // Numeric invariants gate the advance past forecast_done
        if stage.produces() == PipelineStatus::ForecastDone {
            let result = next.forecast_result.as_ref().ok_or_else(|| {
                PipelineError::ContractViolation {
                    agent: stage.name().to_string(),
                    detail: "forecast stage produced no result".to_string(),
                }
            })?;
            result
                .validate()
                .map_err(|e| escalate_invariant(stage.name(), e))?;
        }

        Ok(())
    }

    fn persist(&self, ctx: &ProjectContext) {
        if let Err(e) = self.sink.store(ctx) {
            warn!(
                article_id = %ctx.article_id,
                sink = self.sink.sink_name(),
                error = %e,
                "Failed to persist terminal context"
            );
        }
    }
}

enum StageResult {
    Advanced(ProjectContext),
    Exhausted {
        context: ProjectContext,
        error: PipelineError,
    },
}

/// Map a non-retryable agent error to its orchestrator-level class.
///
/// Matched exhaustively so that a new [`AgentError`] variant forces an
/// explicit classification here instead of inheriting one silently.
fn escalate(agent: &str, err: AgentError) -> PipelineError {
    match err {
        AgentError::Invariant(source) => escalate_invariant(agent, source),
        err @ (AgentError::Upstream(_) | AgentError::MissingInput(_)) => {
            PipelineError::ContractViolation {
                agent: agent.to_string(),
                detail: err.to_string(),
            }
        }
    }
}

/// Empty targets are a contract violation in their own right; numeric
/// violations keep the dedicated invariant class (same fatality).
fn escalate_invariant(agent: &str, source: DataInvariantError) -> PipelineError {
    if source == DataInvariantError::EmptyTargets {
        PipelineError::ContractViolation {
            agent: agent.to_string(),
            detail: "forecast produced no targets".to_string(),
        }
    } else {
        PipelineError::DataInvariant {
            agent: agent.to_string(),
            source,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
