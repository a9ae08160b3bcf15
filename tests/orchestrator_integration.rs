//! End-to-end orchestrator tests.
//!
//! Runs real articles through the full seven-stage roster with the synthetic
//! poll backend, and exercises the review hold, resume, cancellation and
//! invariant-escalation paths that unit tests only cover with stubs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use foresight::agents::{default_agents, Agent};
use foresight::backend::SyntheticBackend;
use foresight::config::PipelineConfig;
use foresight::context::{CriticIssue, IssueSeverity, PipelineStatus, ProjectContext};
use foresight::error::{AgentError, PipelineError};
use foresight::forecast::{ForecastResult, PartyForecast, DEFAULT_MODEL_NAME};
use foresight::pipeline::{Orchestrator, RunOutcome};
use foresight::sink::{ContextSink, MemorySink, ReviewNotifier, SledSink};
use foresight::source::{sample_article, SampleSource};

fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.retry.max_attempts = 2;
    config.retry.backoff_base_ms = 1;
    config.timeouts.agent_budget_secs = 10;
    config
}

fn full_orchestrator(config: PipelineConfig, sink: Arc<dyn ContextSink>) -> Orchestrator {
    let stages = default_agents(Arc::new(SyntheticBackend), &config.forecast);
    Orchestrator::new(stages, config, sink, Arc::new(CountingNotifier::new()))
}

/// Review notifier that counts deliveries instead of logging.
struct CountingNotifier {
    fired: AtomicU64,
}

impl CountingNotifier {
    fn new() -> Self {
        Self {
            fired: AtomicU64::new(0),
        }
    }
}

impl ReviewNotifier for CountingNotifier {
    fn notify(&self, _ctx: &ProjectContext, _issues: &[CriticIssue]) {
        self.fired.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::test]
async fn sample_article_publishes_end_to_end() {
    let sink = MemorySink::new();
    let orchestrator = full_orchestrator(fast_config(), sink.clone());

    let outcome = orchestrator
        .run_article(&SampleSource, "sample-001", &CancellationToken::new())
        .await
        .unwrap();

    let ctx = match outcome {
        RunOutcome::Published(ctx) => ctx,
        other => panic!("expected published outcome, got {:?}", other.context().status),
    };

    assert_eq!(ctx.status, PipelineStatus::Published);
    assert_eq!(ctx.topic, "politics");
    assert!(ctx.project_id.is_some());
    assert!(ctx.metadata.contains_key("published_at"));

    // The forecast must survive the orchestrator's numeric gate.
    let result = ctx.forecast_result.as_ref().unwrap();
    assert_eq!(result.model_name, DEFAULT_MODEL_NAME);
    assert!(result.validate().is_ok());
    let prob_sum: f64 = result.targets.iter().map(|t| t.win_prob).sum();
    assert!((prob_sum - 1.0).abs() < 1e-9);
    for target in &result.targets {
        let p10 = target.quantiles["p10"];
        let p90 = target.quantiles["p90"];
        assert!(p10 <= p90, "{}: p10 {} > p90 {}", target.party, p10, p90);
    }

    // The draft, methodology and charts are all present on the stored copy.
    assert!(!ctx.forecast_narrative.is_empty());
    assert!(ctx.draft_sections.contains_key("headline"));
    assert!(ctx.methodology.contains(DEFAULT_MODEL_NAME));
    assert_eq!(ctx.charts.len(), 2);

    let stored = sink.get(ctx.project_id.as_deref().unwrap()).unwrap();
    assert_eq!(stored.status, PipelineStatus::Published);

    let stats = orchestrator.stats();
    assert_eq!(stats.runs_started, 1);
    assert_eq!(stats.published, 1);
    assert_eq!(stats.failed, 0);
}

/// Wraps a real agent and records each status it produces.
struct RecordingAgent {
    inner: Box<dyn Agent>,
    log: Arc<std::sync::Mutex<Vec<PipelineStatus>>>,
}

#[async_trait]
impl Agent for RecordingAgent {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn requires(&self) -> PipelineStatus {
        self.inner.requires()
    }

    fn produces(&self) -> PipelineStatus {
        self.inner.produces()
    }

    async fn run(&self, ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        let out = self.inner.run(ctx).await?;
        self.log.lock().unwrap().push(out.status);
        Ok(out)
    }
}

#[tokio::test]
async fn statuses_visited_once_in_declared_order() {
    let config = fast_config();
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let stages: Vec<Box<dyn Agent>> =
        default_agents(Arc::new(SyntheticBackend), &config.forecast)
            .into_iter()
            .map(|inner| {
                Box::new(RecordingAgent {
                    inner,
                    log: log.clone(),
                }) as Box<dyn Agent>
            })
            .collect();
    let orchestrator = Orchestrator::new(
        stages,
        config,
        MemorySink::new(),
        Arc::new(CountingNotifier::new()),
    );

    let outcome = orchestrator
        .run(
            ProjectContext::from_article(sample_article()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Published(_)));

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            PipelineStatus::TopicDone,
            PipelineStatus::DataDone,
            PipelineStatus::ForecastDone,
            PipelineStatus::DraftDone,
            PipelineStatus::CriticDone,
            PipelineStatus::GovernanceDone,
            PipelineStatus::Published,
        ]
    );
}

#[tokio::test]
async fn independent_runs_do_not_interfere() {
    let sink = MemorySink::new();
    let orchestrator = Arc::new(full_orchestrator(fast_config(), sink.clone()));
    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    for i in 0..4 {
        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let mut article = sample_article();
            article.id = format!("concurrent-{i}");
            orchestrator
                .run(ProjectContext::from_article(article), &cancel)
                .await
        }));
    }

    let mut article_ids = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RunOutcome::Published(ctx) => article_ids.push(ctx.article_id),
            other => panic!("run ended at {:?}", other.context().status),
        }
    }

    article_ids.sort();
    assert_eq!(
        article_ids,
        ["concurrent-0", "concurrent-1", "concurrent-2", "concurrent-3"]
    );
    assert_eq!(sink.count(), 4);
    assert_eq!(orchestrator.stats().published, 4);
}

#[tokio::test]
async fn rerunning_published_context_is_idempotent() {
    let sink = MemorySink::new();
    let orchestrator = full_orchestrator(fast_config(), sink.clone());
    let cancel = CancellationToken::new();

    let ctx = ProjectContext::from_article(sample_article());
    let published = match orchestrator.run(ctx, &cancel).await.unwrap() {
        RunOutcome::Published(ctx) => ctx,
        other => panic!("run ended at {:?}", other.context().status),
    };
    assert_eq!(sink.deliveries(), 1);

    // Feeding the already-published context back re-persists under the same
    // key without re-running any stage.
    let replay = orchestrator.run(published.clone(), &cancel).await.unwrap();
    let replayed = match replay {
        RunOutcome::Published(ctx) => ctx,
        other => panic!("replay ended at {:?}", other.context().status),
    };
    assert_eq!(replayed.project_id, published.project_id);
    assert_eq!(sink.count(), 1);
    assert_eq!(sink.deliveries(), 2);
}

/// Stage that never finishes within any reasonable budget.
struct StalledTopicAgent;

#[async_trait]
impl Agent for StalledTopicAgent {
    fn name(&self) -> &'static str {
        "stalled_topic"
    }

    fn requires(&self) -> PipelineStatus {
        PipelineStatus::Ingested
    }

    fn produces(&self) -> PipelineStatus {
        PipelineStatus::TopicDone
    }

    async fn run(&self, mut ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        ctx.status = PipelineStatus::TopicDone;
        Ok(ctx)
    }
}

#[tokio::test]
async fn timeout_counts_as_failure_and_exhausts_retries() {
    let mut config = fast_config();
    config.retry.max_attempts = 2;
    config.timeouts.agent_budget_secs = 1;

    let sink = MemorySink::new();
    let orchestrator = Orchestrator::new(
        vec![Box::new(StalledTopicAgent)],
        config,
        sink.clone(),
        Arc::new(CountingNotifier::new()),
    );

    let outcome = orchestrator
        .run(
            ProjectContext::from_article(sample_article()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let RunOutcome::Failed { context, error } = outcome else {
        panic!("expected failed outcome");
    };
    match error {
        PipelineError::AgentFailed {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert!(last_error.contains("timed out"), "{last_error}");
        }
        other => panic!("expected AgentFailed, got {other}"),
    }
    assert_eq!(context.status, PipelineStatus::Failed);

    // A timed-out run is persisted like any other failure.
    let stored = sink.get(context.sink_key()).unwrap();
    assert!(stored.metadata.contains_key(ProjectContext::LAST_ERROR_KEY));
    assert_eq!(orchestrator.stats().retries, 1);
}

#[tokio::test]
async fn cancellation_fails_cleanly_at_stage_boundary() {
    let sink = MemorySink::new();
    let orchestrator = full_orchestrator(fast_config(), sink.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = orchestrator
        .run(ProjectContext::from_article(sample_article()), &cancel)
        .await
        .unwrap();

    match outcome {
        RunOutcome::Failed { context, error } => {
            assert!(matches!(error, PipelineError::Cancelled { .. }));
            assert_eq!(context.status, PipelineStatus::Failed);
            assert!(context.metadata.contains_key(ProjectContext::LAST_ERROR_KEY));
        }
        other => panic!("expected failed outcome, got {:?}", other.context().status),
    }
    // The failed run is persisted for inspection.
    assert_eq!(sink.count(), 1);
}

// ----------------------------------------------------------------------------
// Review hold and resume with a critic that always objects
// ----------------------------------------------------------------------------

/// Critic stand-in that raises one High issue on every draft.
struct HarshCritic;

#[async_trait]
impl Agent for HarshCritic {
    fn name(&self) -> &'static str {
        "harsh_critic"
    }

    fn requires(&self) -> PipelineStatus {
        PipelineStatus::DraftDone
    }

    fn produces(&self) -> PipelineStatus {
        PipelineStatus::CriticDone
    }

    async fn run(&self, mut ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        ctx.critic_issues.push(CriticIssue {
            severity: IssueSeverity::High,
            message: "lede overstates certainty".to_string(),
            location: "lede".to_string(),
        });
        ctx.status = PipelineStatus::CriticDone;
        Ok(ctx)
    }
}

fn roster_with_harsh_critic(config: &PipelineConfig) -> Vec<Box<dyn Agent>> {
    let mut stages = default_agents(Arc::new(SyntheticBackend), &config.forecast);
    let critic_slot = stages
        .iter()
        .position(|s| s.produces() == PipelineStatus::CriticDone)
        .unwrap();
    stages[critic_slot] = Box::new(HarshCritic);
    stages
}

#[tokio::test]
async fn blocking_issue_holds_run_then_resume_publishes() {
    let config = fast_config();
    let sink = MemorySink::new();
    let notifier = Arc::new(CountingNotifier::new());
    let orchestrator = Orchestrator::new(
        roster_with_harsh_critic(&config),
        config,
        sink.clone(),
        notifier.clone(),
    );
    let cancel = CancellationToken::new();

    let outcome = orchestrator
        .run(ProjectContext::from_article(sample_article()), &cancel)
        .await
        .unwrap();

    let mut held = match outcome {
        RunOutcome::PendingReview(ctx) => ctx,
        other => panic!("expected review hold, got {:?}", other.context().status),
    };
    assert_eq!(held.status, PipelineStatus::PendingReview);
    assert_eq!(notifier.fired.load(Ordering::Relaxed), 1);
    // The held context is persisted so a reviewer can pick it up later.
    assert_eq!(sink.count(), 1);
    assert_eq!(orchestrator.stats().held_for_review, 1);

    // Resume without addressing the objection is rejected.
    let err = orchestrator.resume(held.clone(), &cancel).await.unwrap_err();
    assert!(matches!(err.error, PipelineError::ContractViolation { .. }));

    // A reviewer clears the issue; the run picks up after the critic stage.
    held.critic_issues.clear();
    let resumed = orchestrator.resume(held, &cancel).await.unwrap();
    match resumed {
        RunOutcome::Published(ctx) => {
            assert_eq!(ctx.status, PipelineStatus::Published);
            assert!(ctx.project_id.is_some());
        }
        other => panic!("resume ended at {:?}", other.context().status),
    }
}

// ----------------------------------------------------------------------------
// Invariant escalation with a forecast stage that emits bad numbers
// ----------------------------------------------------------------------------

/// Forecast stand-in that emits an out-of-range win probability.
struct BrokenForecaster;

#[async_trait]
impl Agent for BrokenForecaster {
    fn name(&self) -> &'static str {
        "broken_forecaster"
    }

    fn requires(&self) -> PipelineStatus {
        PipelineStatus::DataDone
    }

    fn produces(&self) -> PipelineStatus {
        PipelineStatus::ForecastDone
    }

    async fn run(&self, mut ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        let mut target = PartyForecast::new("Unity Party", 320.0, 12.0, 0.5)
            .map_err(AgentError::Invariant)?;
        target.win_prob = 1.4;
        ctx.forecast_result = Some(ForecastResult {
            targets: vec![target],
            model_name: DEFAULT_MODEL_NAME.to_string(),
            run_at: chrono::Utc::now(),
            metadata: Default::default(),
        });
        ctx.status = PipelineStatus::ForecastDone;
        Ok(ctx)
    }
}

#[tokio::test]
async fn invalid_forecast_leaves_context_at_data_done() {
    let config = fast_config();
    let sink = MemorySink::new();
    let mut stages = default_agents(Arc::new(SyntheticBackend), &config.forecast);
    let forecast_slot = stages
        .iter()
        .position(|s| s.produces() == PipelineStatus::ForecastDone)
        .unwrap();
    stages[forecast_slot] = Box::new(BrokenForecaster);
    let orchestrator = Orchestrator::new(
        stages,
        config,
        sink.clone(),
        Arc::new(CountingNotifier::new()),
    );

    let err = orchestrator
        .run(
            ProjectContext::from_article(sample_article()),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err.error, PipelineError::DataInvariant { .. }));
    // The context is handed back at the last good stage, not advanced and
    // not persisted.
    assert_eq!(err.context.status, PipelineStatus::DataDone);
    assert!(err.context.dataset.is_some());
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn sled_sink_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = {
        let sink = Arc::new(SledSink::open(dir.path()).unwrap());
        let orchestrator = full_orchestrator(fast_config(), sink.clone());
        let outcome = orchestrator
            .run_article(&SampleSource, "sample-001", &CancellationToken::new())
            .await
            .unwrap();
        sink.flush().unwrap();
        outcome
    };

    let project_id = match outcome {
        RunOutcome::Published(ctx) => ctx.project_id.unwrap(),
        other => panic!("run ended at {:?}", other.context().status),
    };

    let reopened = SledSink::open(dir.path()).unwrap();
    let stored = reopened.load(&project_id).unwrap().unwrap();
    assert_eq!(stored.status, PipelineStatus::Published);
    assert_eq!(reopened.stats().published, 1);
}
