//! Core domain types for Debrief briefings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for briefing run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Headline
// ---------------------------------------------------------------------------

/// One record from the embedding map, enriched as it moves through the pipeline.
///
/// Fields the pipeline does not know about are kept in `extra` so checkpoints
/// carry the full record returned by the map service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    /// The embedded text (usually the headline or post body).
    #[serde(default)]
    pub embed_text: String,
    /// Name of the feed the record came from.
    #[serde(default)]
    pub feed_title: String,
    /// Article URL, when the record has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Scraped article text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
    /// Model-written summary of the article.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Remaining fields from the map service, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Headline {
    /// Build a bare headline (mostly for tests and fixtures).
    pub fn new(embed_text: impl Into<String>, feed_title: impl Into<String>) -> Self {
        Self {
            embed_text: embed_text.into(),
            feed_title: feed_title.into(),
            link: None,
            article: None,
            summary: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach an article link.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Whether this record comes from a social feed that is never scraped.
    pub fn is_social(&self, skip_feeds: &[String]) -> bool {
        skip_feeds.iter().any(|f| f == &self.feed_title)
    }
}

// ---------------------------------------------------------------------------
// Briefing
// ---------------------------------------------------------------------------

/// The combined briefing produced by a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Briefing {
    pub run_id: RunId,
    pub persona: String,
    pub text: String,
    /// Headlines sampled from the map.
    pub candidate_count: usize,
    /// Headlines judged relevant to the persona.
    pub relevant_count: usize,
    /// Relevant headlines that received a summary.
    pub summarized_count: usize,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Run history
// ---------------------------------------------------------------------------

/// Lifecycle state of a recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A row of run history, as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub persona: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub candidate_count: usize,
    pub relevant_count: usize,
    pub summarized_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub briefing: Option<String>,
}
