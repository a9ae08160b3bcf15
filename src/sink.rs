//! Terminal-context sink and review-hold notifier.
//!
//! Every run ends with a handoff: the terminal context (published, failed,
//! or held for review) goes to a [`ContextSink`] for durable storage, and
//! runs entering review additionally fire a [`ReviewNotifier`] carrying
//! the triggering issues.
//!
//! Sinks must be idempotent under re-delivery of the same project id:
//! storing the same key twice leaves a single record.

use crate::context::{CriticIssue, PipelineStatus, ProjectContext};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Sink failures.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sled::Error> for SinkError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Trait for terminal-context storage backends.
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across concurrent pipeline runs.
pub trait ContextSink: Send + Sync {
    /// Store a terminal context, keyed by [`ProjectContext::sink_key`].
    /// Re-delivery of the same key must be idempotent.
    fn store(&self, ctx: &ProjectContext) -> Result<(), SinkError>;

    /// Backend name for logging.
    fn sink_name(&self) -> &'static str;
}

/// Notifier invoked when a run enters `pending_review`.
pub trait ReviewNotifier: Send + Sync {
    fn notify(&self, ctx: &ProjectContext, issues: &[CriticIssue]);
}

/// Logs review holds through tracing. The default notifier.
pub struct LogNotifier;

impl ReviewNotifier for LogNotifier {
    fn notify(&self, ctx: &ProjectContext, issues: &[CriticIssue]) {
        warn!(
            article_id = %ctx.article_id,
            issues = issues.len(),
            "Run held for editorial review"
        );
        for issue in issues {
            warn!(
                severity = %issue.severity,
                location = %issue.location,
                "  review issue: {}",
                issue.message
            );
        }
    }
}

// ============================================================================
// In-Memory Sink
// ============================================================================

/// In-memory sink for tests and minimal deployments.
///
/// Thread-safe via `RwLock`. Not durable — data lost on restart.
#[derive(Default)]
pub struct MemorySink {
    entries: RwLock<BTreeMap<String, ProjectContext>>,
    deliveries: std::sync::atomic::AtomicU64,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of distinct stored contexts.
    pub fn count(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Total store calls, including idempotent re-deliveries.
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Fetch a stored context by sink key.
    pub fn get(&self, key: &str) -> Option<ProjectContext> {
        self.entries.read().ok()?.get(key).cloned()
    }
}

impl ContextSink for MemorySink {
    fn store(&self, ctx: &ProjectContext) -> Result<(), SinkError> {
        self.deliveries
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut entries = self
            .entries
            .write()
            .map_err(|e| SinkError::Storage(e.to_string()))?;
        entries.insert(ctx.sink_key().to_string(), ctx.clone());
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Sled Sink
// ============================================================================

/// Durable sink backed by sled with JSON values.
///
/// Key: the context's sink key (project id, or article id pre-publish).
/// Value: JSON-serialized `ProjectContext`. `insert` overwrites, so
/// re-delivery of the same key is naturally idempotent.
///
/// Does not flush on every write; sled's background flushing provides
/// durability, and at most the last few writes are lost on crash.
#[derive(Clone)]
pub struct SledSink {
    db: Arc<sled::Db>,
}

impl SledSink {
    /// Open or create the sink at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Load a stored context by sink key.
    pub fn load(&self, key: &str) -> Result<Option<ProjectContext>, SinkError> {
        match self.db.get(key.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Number of stored contexts.
    pub fn count(&self) -> usize {
        self.db.len()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), SinkError> {
        self.db.flush()?;
        Ok(())
    }

    /// Per-status counts over all stored contexts.
    ///
    /// Exposes raw counts only — no derived "active" metric. Staleness
    /// semantics are a consumer decision, not a sink property.
    pub fn stats(&self) -> SinkStats {
        let mut stats = SinkStats::default();
        for item in self.db.iter() {
            let Ok((_key, value)) = item else { continue };
            let Ok(ctx) = serde_json::from_slice::<ProjectContext>(&value) else {
                continue;
            };
            stats.total += 1;
            match ctx.status {
                PipelineStatus::Published => stats.published += 1,
                PipelineStatus::Failed => stats.failed += 1,
                PipelineStatus::PendingReview => stats.pending_review += 1,
                _ => stats.in_flight += 1,
            }
        }
        stats
    }
}

impl ContextSink for SledSink {
    fn store(&self, ctx: &ProjectContext) -> Result<(), SinkError> {
        let value = serde_json::to_vec(ctx)?;
        self.db.insert(ctx.sink_key().as_bytes(), value)?;
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "sled"
    }
}

/// Per-status counts for stored contexts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub total: usize,
    pub published: usize,
    pub failed: usize,
    pub pending_review: usize,
    /// Contexts stored with a non-terminal status (crash recovery leftovers)
    pub in_flight: usize,
}

// ============================================================================
// Tests
// ============================================================================
