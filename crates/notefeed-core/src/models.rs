//! Core data models used throughout notefeed.
//!
//! These types represent the external items that flow through the topic
//! ingestion pipeline, the per-user interactions recorded against them,
//! and the notes that feed retrieval and personalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of tags kept on a topic.
pub const MAX_TAGS: usize = 5;
/// Tags must be strictly shorter than this many characters.
pub const MAX_TAG_CHARS: usize = 30;

/// Raw item produced by a connector before normalization.
///
/// Produced fresh on every fetch and never persisted directly.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTopic {
    pub title: String,
    pub description: Option<String>,
    pub source_url: Option<String>,
    pub source_id: String,
    pub score: i64,
    pub tags: Vec<String>,
}

/// Applies the tag limits: drops empty and over-long tags and duplicates,
/// keeps the first [`MAX_TAGS`] in order.
pub fn clean_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag: String = tag.into();
        let tag = tag.trim();
        if tag.is_empty() || tag.chars().count() >= MAX_TAG_CHARS {
            continue;
        }
        if out.iter().any(|t| t == tag) {
            continue;
        }
        out.push(tag.to_string());
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}

/// Write shape for a topic upsert, keyed by `(source, source_id)`.
#[derive(Debug, Clone)]
pub struct NewTopic {
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub description: Option<String>,
    pub source_url: Option<String>,
    pub score: i64,
    pub tags: Vec<String>,
    /// `None` leaves any stored embedding untouched.
    pub embedding: Option<Vec<f32>>,
    pub content_hash: String,
}

/// Durable ingested external item.
#[derive(Debug, Clone, Serialize)]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub source_url: Option<String>,
    pub source: String,
    pub source_id: String,
    pub score: i64,
    pub tags: Vec<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip)]
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of a single topic upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// A per-user action on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Viewed,
    Saved,
    Skipped,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Viewed => "viewed",
            Action::Saved => "saved",
            Action::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewed" => Ok(Action::Viewed),
            "saved" => Ok(Action::Saved),
            "skipped" => Ok(Action::Skipped),
            other => anyhow::bail!(
                "unknown action: '{}'. Must be viewed, saved, or skipped.",
                other
            ),
        }
    }
}

/// A recorded interaction. Unique per `(user_id, topic_id, action)`.
#[derive(Debug, Clone, Serialize)]
pub struct Interaction {
    pub user_id: String,
    pub topic_id: String,
    pub action: Action,
    pub created_at: DateTime<Utc>,
}

/// A topic annotated with a personalized relevance score.
#[derive(Debug, Clone)]
pub struct ScoredTopic {
    pub topic: Topic,
    pub relevance_score: f64,
}

/// A feed entry: topic, relevance, and the user's recorded actions.
#[derive(Debug, Clone, Serialize)]
pub struct RankedTopic {
    #[serde(flatten)]
    pub topic: Topic,
    pub relevance_score: f64,
    pub user_actions: Vec<Action>,
}

impl RankedTopic {
    pub fn has_action(&self, action: Action) -> bool {
        self.user_actions.contains(&action)
    }
}

/// A user's note.
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A note search hit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NoteMatch {
    pub note_id: String,
    pub content: String,
    pub similarity: f64,
}

/// Notes per tag for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagCount {
    pub name: String,
    pub color: Option<String>,
    pub note_count: u64,
}

/// Summary of a user's knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeStats {
    /// Most-used tags first.
    pub tag_stats: Vec<TagCount>,
    pub total_notes: u64,
    /// Notes with at least one stored chunk vector.
    pub embedded_notes: u64,
    pub saved_topics: u64,
}

/// A persisted chat conversation owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_tags_limits() {
        let tags = clean_tags([
            "ai",
            "ml",
            "ai",
            "",
            "this-tag-is-definitely-far-too-long-to-keep",
            "llm",
            "rust",
            "gpt",
            "extra",
        ]);
        assert_eq!(tags, vec!["ai", "ml", "llm", "rust", "gpt"]);
    }

    #[test]
    fn test_clean_tags_boundary_length() {
        let ok = "a".repeat(MAX_TAG_CHARS - 1);
        let too_long = "b".repeat(MAX_TAG_CHARS);
        let tags = clean_tags([ok.clone(), too_long]);
        assert_eq!(tags, vec![ok]);
    }

    #[test]
    fn test_action_parse_and_display() {
        for action in [Action::Viewed, Action::Saved, Action::Skipped] {
            let parsed: Action = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
            assert_eq!(parsed.to_string(), action.as_str());
        }
        assert!("liked".parse::<Action>().is_err());
    }

    #[test]
    fn test_ranked_topic_serializes_flat() {
        let now = Utc::now();
        let ranked = RankedTopic {
            topic: Topic {
                id: "t1".into(),
                title: "Title".into(),
                description: None,
                source_url: None,
                source: "devto".into(),
                source_id: "42".into(),
                score: 7,
                tags: vec!["ai".into()],
                embedding: Some(vec![0.1, 0.2]),
                content_hash: "abc".into(),
                fetched_at: now,
                created_at: now,
            },
            relevance_score: 0.0,
            user_actions: vec![Action::Saved],
        };
        let json = serde_json::to_value(&ranked).unwrap();
        assert_eq!(json["id"], "t1");
        assert_eq!(json["source_id"], "42");
        assert_eq!(json["user_actions"][0], "saved");
        assert!(json.get("embedding").is_none());
        assert!(json.get("content_hash").is_none());
    }
}
