//! Project Context and Pipeline Status
//!
//! The shared record threaded through the editorial pipeline, plus the
//! closed status enum governing stage progression. The context is pure
//! data: construction and field access only, no orchestration logic.
//!
//! Ownership rule: exactly one pipeline run owns a context at a time.
//! Agents consume a context by value and return a new one, so a failed
//! stage attempt can never leak partial writes into the next attempt.

use crate::forecast::ForecastResult;
use crate::source::Article;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Pipeline Status
// ============================================================================

/// Pipeline processing status for one article's project.
///
/// Forward states advance strictly in declared order; `Failed` and
/// `PendingReview` are side states reachable from any non-terminal state.
/// A context never regresses except via the explicit external resume path
/// (`Orchestrator::resume`), which re-enters at `CriticDone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Source article ingested, nothing derived yet
    Ingested,
    /// Topic classified and entities extracted
    TopicDone,
    /// Forecast spec designed and dataset attached
    DataDone,
    /// Numeric forecast computed and validated
    ForecastDone,
    /// Narrative and draft sections rendered
    DraftDone,
    /// Editorial critique complete
    CriticDone,
    /// Methodology and charts assembled
    GovernanceDone,
    /// Publishable project materialized (terminal)
    Published,
    /// Run aborted after retry exhaustion or cancellation (terminal)
    Failed,
    /// Halted at the review gate pending external input (terminal for the run)
    PendingReview,
}

impl PipelineStatus {
    /// Position of a forward state in the declared stage order.
    ///
    /// Side states (`Failed`, `PendingReview`) have no rank — "at or past"
    /// comparisons only apply while the pipeline is moving forward.
    pub fn rank(self) -> Option<u8> {
        match self {
            Self::Ingested => Some(0),
            Self::TopicDone => Some(1),
            Self::DataDone => Some(2),
            Self::ForecastDone => Some(3),
            Self::DraftDone => Some(4),
            Self::CriticDone => Some(5),
            Self::GovernanceDone => Some(6),
            Self::Published => Some(7),
            Self::Failed | Self::PendingReview => None,
        }
    }

    /// Whether this state ends a pipeline run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Failed | Self::PendingReview)
    }

    /// Whether a context in this state is at or past the given forward state.
    pub fn at_or_past(self, other: Self) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ingested => "ingested",
            Self::TopicDone => "topic_done",
            Self::DataDone => "data_done",
            Self::ForecastDone => "forecast_done",
            Self::DraftDone => "draft_done",
            Self::CriticDone => "critic_done",
            Self::GovernanceDone => "governance_done",
            Self::Published => "published",
            Self::Failed => "failed",
            Self::PendingReview => "pending_review",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// Supporting records
// ============================================================================

/// Detected entity from the source article (party, organisation, place, person).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            metadata: BTreeMap::new(),
        }
    }
}

/// What to forecast and how: output of the data-design stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSpec {
    /// e.g. "UK national seat share for Party A"
    pub target: String,
    /// e.g. "next election date"
    pub horizon: String,
    /// national | regional
    pub granularity: String,
    #[serde(default)]
    pub constraints: BTreeMap<String, serde_json::Value>,
    pub topic: String,
}

impl ForecastSpec {
    /// Default constraints payload carried by every spec unless overridden.
    pub fn default_constraints() -> BTreeMap<String, serde_json::Value> {
        let mut constraints = BTreeMap::new();
        constraints.insert("probabilistic".to_string(), serde_json::json!(true));
        constraints.insert("uncertainty_bands".to_string(), serde_json::json!(true));
        constraints.insert("refresh_cadence".to_string(), serde_json::json!("daily"));
        constraints
    }
}

/// Severity of an editorial issue raised by the critic stage.
///
/// Ordering matters: the review gate compares against a configured
/// threshold, so `Low < Medium < High` must hold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One issue raised by the critic stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticIssue {
    pub severity: IssueSeverity,
    pub message: String,
    /// Section name or field the issue refers to
    pub location: String,
}

/// One poll-like observation in an attached dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollObservation {
    pub party: String,
    /// Vote share in percent
    pub share: f64,
    pub sample_size: u32,
    pub observed_at: DateTime<Utc>,
}

/// Structured dataset payload attached by the data stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub observations: Vec<PollObservation>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Dataset {
    /// Total respondents across all observations.
    pub fn total_sample_size(&self) -> u64 {
        self.observations.iter().map(|o| u64::from(o.sample_size)).sum()
    }

    /// Distinct party labels in observation order.
    pub fn parties(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for obs in &self.observations {
            if !seen.contains(&obs.party) {
                seen.push(obs.party.clone());
            }
        }
        seen
    }
}

/// Chart specification produced by the governance stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    /// bar | interval | probability
    pub chart_type: String,
    pub data: serde_json::Value,
}

// ============================================================================
// Project Context
// ============================================================================

/// Shared context passed between pipeline agents.
///
/// Serializes losslessly for the terminal-sink handoff; every populated
/// field round-trips. Metadata key [`ProjectContext::LAST_ERROR_KEY`] holds
/// the triggering error on failed runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub article_id: String,
    /// Absent until the publish stage materializes a project
    pub project_id: Option<String>,
    pub topic: String,
    pub entities: Vec<Entity>,
    pub data_template: String,
    pub dataset: Option<Dataset>,
    pub dataset_id: Option<String>,
    pub forecast_spec: Option<ForecastSpec>,
    pub forecast_result: Option<ForecastResult>,
    /// Warning tags appended by the forecast stage; append-only within a run
    pub calibration_flags: Vec<String>,
    pub forecast_narrative: String,
    pub draft_sections: BTreeMap<String, String>,
    pub critic_issues: Vec<CriticIssue>,
    pub methodology: String,
    pub status: PipelineStatus,
    pub origin_article: Option<Article>,
    pub analysis_findings: BTreeMap<String, serde_json::Value>,
    pub scenarios: Vec<serde_json::Value>,
    pub charts: Vec<ChartSpec>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ProjectContext {
    /// Metadata key recording the last error on a failed run.
    pub const LAST_ERROR_KEY: &'static str = "last_error";

    /// Create a fresh context at `Ingested` for one source article.
    pub fn from_article(article: Article) -> Self {
        Self {
            article_id: article.id.clone(),
            project_id: None,
            topic: String::new(),
            entities: Vec::new(),
            data_template: String::new(),
            dataset: None,
            dataset_id: None,
            forecast_spec: None,
            forecast_result: None,
            calibration_flags: Vec::new(),
            forecast_narrative: String::new(),
            draft_sections: BTreeMap::new(),
            critic_issues: Vec::new(),
            methodology: String::new(),
            status: PipelineStatus::Ingested,
            origin_article: Some(article),
            analysis_findings: BTreeMap::new(),
            scenarios: Vec::new(),
            charts: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Key under which the terminal sink stores this context.
    ///
    /// The project id once materialized, otherwise the article id — so a
    /// run that fails before publish still lands under a stable key.
    pub fn sink_key(&self) -> &str {
        self.project_id.as_deref().unwrap_or(&self.article_id)
    }

    /// Mark the context failed, recording the triggering error.
    pub fn mark_failed(&mut self, reason: &str) {
        self.metadata.insert(
            Self::LAST_ERROR_KEY.to_string(),
            serde_json::json!(reason),
        );
        self.status = PipelineStatus::Failed;
    }

    /// Highest-severity critic issues at or above a threshold.
    pub fn blocking_issues(&self, threshold: IssueSeverity) -> Vec<&CriticIssue> {
        self.critic_issues
            .iter()
            .filter(|i| i.severity >= threshold)
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
