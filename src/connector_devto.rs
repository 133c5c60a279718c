//! Dev.to adapter.
//!
//! Queries the top articles of the last `top_days` for each configured tag
//! and merges them, de-duplicated by article id, in tag order.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use notefeed_core::models::clean_tags;
use notefeed_core::RawTopic;

use crate::config::DevtoConfig;
use crate::traits::TopicConnector;

#[derive(Debug, Deserialize)]
struct DevtoArticle {
    id: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    positive_reactions_count: Option<i64>,
    #[serde(default)]
    tag_list: Option<Vec<String>>,
}

pub struct DevtoConnector {
    client: reqwest::Client,
    config: DevtoConfig,
}

impl DevtoConnector {
    pub fn new(config: DevtoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    async fn articles_for_tag(&self, tag: &str) -> Option<Vec<DevtoArticle>> {
        let url = format!("{}/articles", self.config.base_url.trim_end_matches('/'));
        let top = self.config.top_days.to_string();
        let per_page = self.config.per_page.to_string();
        let response = match self
            .client
            .get(&url)
            .query(&[("tag", tag), ("top", top.as_str()), ("per_page", per_page.as_str())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(tag, error = %e, "devto: request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::warn!(tag, status = %response.status(), "devto: request rejected");
            return None;
        }
        let values: Vec<serde_json::Value> = match response.json().await {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(tag, error = %e, "devto: undecodable body");
                return None;
            }
        };

        // One malformed article must not cost the rest of the page
        let articles = values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<DevtoArticle>(value) {
                Ok(article) => Some(article),
                Err(e) => {
                    tracing::debug!(tag, error = %e, "devto: skipping malformed article");
                    None
                }
            })
            .collect();
        Some(articles)
    }
}

#[async_trait]
impl TopicConnector for DevtoConnector {
    fn name(&self) -> &str {
        "devto"
    }

    fn max_items(&self) -> usize {
        self.config.max_items
    }

    async fn fetch(&self, max_items: usize) -> Vec<RawTopic> {
        let mut results = Vec::new();
        let mut seen: HashSet<u64> = HashSet::new();

        for tag in &self.config.tags {
            if results.len() >= max_items {
                break;
            }
            let Some(articles) = self.articles_for_tag(tag).await else {
                continue;
            };
            for article in articles {
                if results.len() >= max_items {
                    break;
                }
                if !seen.insert(article.id) {
                    continue;
                }
                results.push(article_to_topic(article));
            }
        }

        tracing::debug!(count = results.len(), "devto: fetched articles");
        results
    }
}

fn article_to_topic(article: DevtoArticle) -> RawTopic {
    RawTopic {
        title: article.title,
        description: article.description.filter(|d| !d.trim().is_empty()),
        source_url: article.url,
        source_id: article.id.to_string(),
        score: article.positive_reactions_count.unwrap_or(0).max(0),
        tags: clean_tags(article.tag_list.unwrap_or_default()),
    }
}
