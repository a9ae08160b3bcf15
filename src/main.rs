//! Foresight - news-to-forecast pipeline
//!
//! Ingests news articles and drives each one through the full editorial
//! pipeline: topic framing, data acquisition, probabilistic forecasting,
//! drafting, criticism, governance and publication.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in sample article through the pipeline
//! cargo run --release
//!
//! # Run specific articles from a directory of <id>.json files
//! cargo run --release -- --articles-dir ./articles art-101 art-102
//! ```
//!
//! # Environment Variables
//!
//! - `FORESIGHT_CONFIG`: Path to a foresight.toml config file
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use foresight::agents::default_agents;
use foresight::backend::SyntheticBackend;
use foresight::config::PipelineConfig;
use foresight::pipeline::{Orchestrator, RunOutcome};
use foresight::sink::{LogNotifier, SledSink};
use foresight::source::{ArticleSource, FileSource, SampleSource};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "foresight")]
#[command(about = "News-to-forecast pipeline orchestrator")]
#[command(version)]
struct CliArgs {
    /// Article ids to run through the pipeline. With --articles-dir each id
    /// is loaded from <dir>/<id>.json; without it the built-in sample
    /// article is used for every id.
    article_ids: Vec<String>,

    /// Directory containing article JSON files
    #[arg(long, value_name = "DIR")]
    articles_dir: Option<String>,

    /// Path to a foresight.toml config file (overrides FORESIGHT_CONFIG)
    #[arg(long, value_name = "FILE")]
    config: Option<String>,

    /// Override the persistent store directory (default from config)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<String>,

    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long)]
    log_json: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize logging
    let log_builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false);
    if args.log_json {
        log_builder.json().init();
    } else {
        log_builder.init();
    }

    let config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(std::path::Path::new(path))
            .with_context(|| format!("failed to load config from {path}"))?,
        None => PipelineConfig::load(),
    };
    let config = config.sanitized();

    let data_dir = args
        .data_dir
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| config.storage.data_dir.clone());

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Foresight - news-to-forecast pipeline");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "Retry: {} attempts | Agent budget: {}s | Store: {}",
        config.retry.max_attempts,
        config.timeouts.agent_budget_secs,
        data_dir.display()
    );

    let sink = Arc::new(
        SledSink::open(&data_dir)
            .with_context(|| format!("failed to open store at {}", data_dir.display()))?,
    );
    let backend = Arc::new(SyntheticBackend);
    let stages = default_agents(backend, &config.forecast);
    let orchestrator = Arc::new(Orchestrator::new(
        stages,
        config,
        sink.clone(),
        Arc::new(LogNotifier),
    ));

    // Graceful shutdown via Ctrl+C; runs stop at the next stage boundary.
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, stopping at the next stage boundary...");
        shutdown_token.cancel();
    });

    let source: Arc<dyn ArticleSource> = match &args.articles_dir {
        Some(dir) => Arc::new(FileSource::new(dir.clone())),
        None => Arc::new(SampleSource),
    };

    let article_ids = if args.article_ids.is_empty() {
        vec!["sample-article".to_string()]
    } else {
        args.article_ids.clone()
    };
    info!("📰 {} article(s) queued", article_ids.len());

    // Each article is an independent run; they share nothing but the sink.
    let mut task_set: JoinSet<()> = JoinSet::new();
    for article_id in article_ids {
        let orchestrator = orchestrator.clone();
        let source = source.clone();
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            match orchestrator
                .run_article(source.as_ref(), &article_id, &cancel)
                .await
            {
                Ok(RunOutcome::Published(ctx)) => {
                    info!(
                        article_id,
                        project_id = ctx.project_id.as_deref().unwrap_or("?"),
                        "✓ Published"
                    );
                }
                Ok(RunOutcome::PendingReview(ctx)) => {
                    info!(
                        article_id,
                        issues = ctx.critic_issues.len(),
                        "Held for editorial review"
                    );
                }
                Ok(RunOutcome::Failed { context: _, error }) => {
                    error!(article_id, error = %error, "Run failed");
                }
                Err(e) => {
                    error!(article_id, error = %e.error, "Run aborted");
                }
            }
        });
    }

    while let Some(res) = task_set.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "Run task panicked");
        }
    }

    sink.flush().context("failed to flush store")?;

    let stats = orchestrator.stats();
    let store = sink.stats();
    info!("");
    info!(
        "Runs: {} started, {} published, {} held, {} failed ({} retries)",
        stats.runs_started, stats.published, stats.held_for_review, stats.failed, stats.retries
    );
    info!(
        "Store: {} projects ({} published, {} pending review, {} failed)",
        store.total, store.published, store.pending_review, store.failed
    );
    info!("✓ Foresight shutdown complete");
    Ok(())
}
