//! Hacker News adapter.
//!
//! Scans the current top stories through the Firebase API and keeps stories
//! whose title mentions an AI-related keyword. Item details are fetched in
//! sequential batches; the requests of one batch run concurrently.
//!
//! # Configuration
//!
//! ```toml
//! [connectors.hackernews]
//! enabled = true
//! max_items = 15
//! scan_limit = 200
//! batch_size = 10
//! ```

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::time::Duration;

use notefeed_core::RawTopic;

use crate::config::HackerNewsConfig;
use crate::traits::TopicConnector;

/// Lowercase keywords matched as substrings of the lowercased title.
pub const AI_KEYWORDS: &[&str] = &[
    "ai",
    "artificial intelligence",
    "machine learning",
    "deep learning",
    "llm",
    "gpt",
    "claude",
    "openai",
    "anthropic",
    "gemini",
    "llama",
    "neural",
    "transformer",
    "diffusion",
    "langchain",
    "rag",
    "chatbot",
    "copilot",
    "agent",
    "embedding",
    "fine-tuning",
    "stable diffusion",
    "midjourney",
    "generative",
];

const ITEM_URL_PREFIX: &str = "https://news.ycombinator.com/item?id=";

#[derive(Debug, Deserialize)]
struct HnItem {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    descendants: Option<i64>,
}

pub struct HackerNewsConnector {
    client: reqwest::Client,
    config: HackerNewsConfig,
}

impl HackerNewsConnector {
    pub fn new(config: HackerNewsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn top_story_ids(&self) -> Option<Vec<u64>> {
        let url = format!("{}/topstories.json", self.base_url());
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "hackernews: top stories request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "hackernews: top stories request rejected");
            return None;
        }
        match response.json::<Vec<u64>>().await {
            Ok(ids) => Some(ids),
            Err(e) => {
                tracing::warn!(error = %e, "hackernews: undecodable top stories body");
                None
            }
        }
    }

    async fn fetch_item(&self, id: u64) -> Option<HnItem> {
        let url = format!("{}/item/{}.json", self.base_url(), id);
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            tracing::debug!(id, status = %response.status(), "hackernews: item skipped");
            return None;
        }
        // The API answers `null` for deleted items
        response.json::<Option<HnItem>>().await.ok().flatten()
    }
}

#[async_trait]
impl TopicConnector for HackerNewsConnector {
    fn name(&self) -> &str {
        "hackernews"
    }

    fn max_items(&self) -> usize {
        self.config.max_items
    }

    async fn fetch(&self, max_items: usize) -> Vec<RawTopic> {
        let Some(ids) = self.top_story_ids().await else {
            return Vec::new();
        };

        let scan: Vec<u64> = ids.into_iter().take(self.config.scan_limit).collect();
        let batch_size = self.config.batch_size.max(1);
        let mut results = Vec::new();

        for batch in scan.chunks(batch_size) {
            if results.len() >= max_items {
                break;
            }
            let items = join_all(batch.iter().map(|id| self.fetch_item(*id))).await;
            for item in items.into_iter().flatten() {
                if results.len() >= max_items {
                    break;
                }
                if let Some(topic) = story_to_topic(item) {
                    results.push(topic);
                }
            }
        }

        tracing::debug!(count = results.len(), "hackernews: fetched AI stories");
        results
    }
}

pub fn is_ai_related(title: &str) -> bool {
    let lower = title.to_lowercase();
    AI_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Heuristic tags from keyword presence in the title. Always includes `"AI"`.
pub fn derive_tags(title: &str) -> Vec<String> {
    let lower = title.to_lowercase();
    let mut tags = vec!["AI".to_string()];
    if ["llm", "gpt", "claude"].iter().any(|k| lower.contains(k)) {
        tags.push("LLM".to_string());
    }
    if lower.contains("open source") || lower.contains("llama") {
        tags.push("Open Source".to_string());
    }
    if lower.contains("agent") {
        tags.push("AI Agent".to_string());
    }
    tags
}

fn story_to_topic(item: HnItem) -> Option<RawTopic> {
    if item.kind.as_deref() != Some("story") {
        return None;
    }
    let title = item.title.filter(|t| !t.trim().is_empty())?;
    if !is_ai_related(&title) {
        return None;
    }

    let score = item.score.unwrap_or(0).max(0);
    let url = item.url.filter(|u| !u.is_empty());
    let description = url.as_ref().map(|_| {
        format!(
            "Hacker News ({} points, {} comments)",
            score,
            item.descendants.unwrap_or(0)
        )
    });

    Some(RawTopic {
        tags: derive_tags(&title),
        title,
        description,
        source_url: Some(url.unwrap_or_else(|| format!("{}{}", ITEM_URL_PREFIX, item.id))),
        source_id: item.id.to_string(),
        score,
    })
}
