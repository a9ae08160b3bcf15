//! Source-article supplier boundary.
//!
//! The pipeline consumes articles through [`ArticleSource`]: given an
//! identifier, return raw text, headline, source label, and publication
//! time. Both failure modes (`NotFound`, `Fetch`) map to a run start
//! failure — the run never begins and nothing is persisted.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw source article as delivered by a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub headline: String,
    pub body: String,
    /// Source label, e.g. the outlet name
    pub source: String,
    pub published_at: DateTime<Utc>,
}

/// Article supplier failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("article '{0}' not found")]
    NotFound(String),

    #[error("fetch error for '{id}': {reason}")]
    Fetch { id: String, reason: String },
}

/// Trait abstracting where source articles come from.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Fetch one article by identifier.
    async fn fetch(&self, article_id: &str) -> Result<Article, SourceError>;

    /// Human-readable name for logging (e.g. "file", "sample").
    fn source_name(&self) -> &'static str;
}

// ============================================================================
// File Source
// ============================================================================

/// Reads articles from `<dir>/<article_id>.json`.
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArticleSource for FileSource {
    async fn fetch(&self, article_id: &str) -> Result<Article, SourceError> {
        let path = self.dir.join(format!("{article_id}.json"));
        if !path.exists() {
            return Err(SourceError::NotFound(article_id.to_string()));
        }
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SourceError::Fetch {
                id: article_id.to_string(),
                reason: e.to_string(),
            })?;
        serde_json::from_str(&raw).map_err(|e| SourceError::Fetch {
            id: article_id.to_string(),
            reason: format!("invalid article JSON: {e}"),
        })
    }

    fn source_name(&self) -> &'static str {
        "file"
    }
}

// ============================================================================
// Sample Source
// ============================================================================

/// Serves the built-in demonstration article for any requested id.
pub struct SampleSource;

#[async_trait]
impl ArticleSource for SampleSource {
    async fn fetch(&self, article_id: &str) -> Result<Article, SourceError> {
        let mut article = sample_article();
        article.id = article_id.to_string();
        Ok(article)
    }

    fn source_name(&self) -> &'static str {
        "sample"
    }
}

/// Built-in demonstration article (a politics story that seeds a full
/// pipeline run without any external supplier).
pub fn sample_article() -> Article {
    Article {
        id: "sample-001".to_string(),
        headline: "Unity Party edges ahead as election race tightens".to_string(),
        body: "With the national election approaching, the latest round of polls \
               shows the Unity Party narrowly ahead of the Heritage Party, while \
               the Forward Alliance trails in third. Analysts at the Electoral \
               Institute caution that the parliament arithmetic remains volatile \
               and that turnout will decide dozens of marginal seats."
            .to_string(),
        source: "National Wire".to_string(),
        published_at: Utc.with_ymd_and_hms(2026, 8, 20, 9, 30, 0)
            .single()
            .unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path());
        let err = source.fetch("missing").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_file_source_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let article = sample_article();
        let path = dir.path().join(format!("{}.json", article.id));
        std::fs::write(&path, serde_json::to_string(&article).unwrap()).unwrap();

        let source = FileSource::new(dir.path());
        let fetched = source.fetch(&article.id).await.unwrap();
        assert_eq!(fetched, article);
    }

    #[tokio::test]
    async fn test_file_source_invalid_json_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let source = FileSource::new(dir.path());
        let err = source.fetch("bad").await.unwrap_err();
        assert!(matches!(err, SourceError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_sample_source_stamps_requested_id() {
        let article = SampleSource.fetch("article-7").await.unwrap();
        assert_eq!(article.id, "article-7");
        assert!(!article.body.is_empty());
    }
}
