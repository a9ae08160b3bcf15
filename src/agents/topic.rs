//! Topic Agent — classification and entity extraction.
//!
//! First stage: reads the origin article, classifies the topic by keyword
//! density, and extracts party/organisation entities with pattern matching.

use super::Agent;
use crate::context::{Entity, PipelineStatus, ProjectContext};
use crate::error::AgentError;
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

/// Keyword lexicons per topic, matched case-insensitively against the
/// article text. The topic with the most hits wins; no hits → "general".
const TOPIC_LEXICONS: [(&str, &[&str]); 2] = [
    (
        "politics",
        &[
            "election", "poll", "parliament", "vote", "party", "seat",
            "campaign", "coalition", "ballot", "turnout",
        ],
    ),
    (
        "economy",
        &[
            "inflation", "gdp", "interest rate", "unemployment", "growth",
            "recession", "central bank",
        ],
    ),
];

pub struct TopicAgent {
    party_re: Regex,
    org_re: Regex,
}

impl TopicAgent {
    // Static patterns, verified by the tests below.
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            party_re: Regex::new(
                r"\b([A-Z][a-z]+(?: [A-Z][a-z]+)* (?:Party|Alliance|Coalition|Union))\b",
            )
            .expect("static party pattern"),
            org_re: Regex::new(
                r"\b([A-Z][a-z]+(?: [A-Z][a-z]+)* (?:Institute|Commission|Office|Agency|Council))\b",
            )
            .expect("static organisation pattern"),
        }
    }

    fn classify(text: &str) -> String {
        let lowered = text.to_lowercase();
        let mut best: (&str, usize) = ("general", 0);
        for (topic, keywords) in TOPIC_LEXICONS {
            let hits: usize = keywords
                .iter()
                .map(|kw| lowered.matches(kw).count())
                .sum();
            if hits > best.1 {
                best = (topic, hits);
            }
        }
        best.0.to_string()
    }

    fn extract_entities(&self, text: &str) -> Vec<Entity> {
        let mut entities: Vec<Entity> = Vec::new();
        let push_unique = |entity_type: &str, name: &str, entities: &mut Vec<Entity>| {
            if !entities.iter().any(|e| e.name == name) {
                entities.push(Entity::new(entity_type, name));
            }
        };

        for m in self.party_re.find_iter(text) {
            push_unique("party", m.as_str(), &mut entities);
        }
        for m in self.org_re.find_iter(text) {
            push_unique("organisation", m.as_str(), &mut entities);
        }
        entities
    }
}

impl Default for TopicAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for TopicAgent {
    fn name(&self) -> &'static str {
        "topic"
    }

    fn requires(&self) -> PipelineStatus {
        PipelineStatus::Ingested
    }

    fn produces(&self) -> PipelineStatus {
        PipelineStatus::TopicDone
    }

    async fn run(&self, mut ctx: ProjectContext) -> Result<ProjectContext, AgentError> {
        let article = ctx
            .origin_article
            .as_ref()
            .ok_or_else(|| AgentError::MissingInput("origin_article".to_string()))?;

        let text = format!("{} {}", article.headline, article.body);
        ctx.topic = Self::classify(&text);
        ctx.entities = self.extract_entities(&text);

        ctx.analysis_findings.insert(
            "entity_count".to_string(),
            serde_json::json!(ctx.entities.len()),
        );

        debug!(
            article_id = %ctx.article_id,
            topic = %ctx.topic,
            entities = ctx.entities.len(),
            "Topic classification complete"
        );

        ctx.status = PipelineStatus::TopicDone;
        Ok(ctx)
    }
}
