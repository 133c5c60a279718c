//! Source adapter trait and registry.
//!
//! Every news source implements [`TopicConnector`]. The ingestion cycle walks
//! the [`ConnectorRegistry`] in registration order and pushes each adapter's
//! [`RawTopic`]s through the upsert engine.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │           ConnectorRegistry              │
//! │  ┌─────────────┐ ┌───────────────────┐   │
//! │  │ Hacker News │ │ Dev.to            │   │
//! │  └─────────────┘ └───────────────────┘   │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!    fetch_and_store_topics() → upsert → sweep
//! ```

use anyhow::Result;
use async_trait::async_trait;

use notefeed_core::RawTopic;

use crate::config::Config;

/// A news source that produces candidate topics.
///
/// `fetch` is best-effort: transport failures, non-2xx responses and
/// undecodable bodies are logged inside the adapter and whatever was
/// collected so far is returned. It never errors.
#[async_trait]
pub trait TopicConnector: Send + Sync {
    /// Source label stored on every topic (e.g. `"hackernews"`).
    ///
    /// Part of the dedup key, so it must stay stable across releases.
    fn name(&self) -> &str;

    /// Label used in logs and ingest error entries.
    fn source_label(&self) -> String {
        self.name().to_string()
    }

    /// Default cap on returned items for this source.
    fn max_items(&self) -> usize;

    async fn fetch(&self, max_items: usize) -> Vec<RawTopic>;
}

/// Ordered collection of source adapters.
pub struct ConnectorRegistry {
    connectors: Vec<Box<dyn TopicConnector>>,
}

impl ConnectorRegistry {
    /// Create an empty connector registry.
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
        }
    }

    /// Create a registry with every adapter enabled in the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::connector_devto::DevtoConnector;
        use crate::connector_hackernews::HackerNewsConnector;

        let mut registry = Self::new();

        if config.connectors.hackernews.enabled {
            registry.register(Box::new(HackerNewsConnector::new(
                config.connectors.hackernews.clone(),
            )?));
        }
        if config.connectors.devto.enabled {
            registry.register(Box::new(DevtoConnector::new(
                config.connectors.devto.clone(),
            )?));
        }

        Ok(registry)
    }

    /// Register a connector.
    pub fn register(&mut self, connector: Box<dyn TopicConnector>) {
        self.connectors.push(connector);
    }

    /// Get all registered connectors.
    pub fn connectors(&self) -> &[Box<dyn TopicConnector>] {
        &self.connectors
    }

    /// Find a connector by name.
    pub fn find(&self, name: &str) -> Option<&dyn TopicConnector> {
        self.connectors
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticConnector;
    use super::*;

    #[test]
    fn test_from_config_respects_enabled_flags() {
        let mut config = Config::minimal();
        let registry = ConnectorRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.find("hackernews").is_some());
        assert!(registry.find("devto").is_some());

        config.connectors.hackernews.enabled = false;
        let registry = ConnectorRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.find("hackernews").is_none());
    }

    #[tokio::test]
    async fn test_registry_preserves_order() {
        let mut registry = ConnectorRegistry::new();
        assert!(registry.is_empty());
        registry.register(Box::new(StaticConnector::new("b", vec![])));
        registry.register(Box::new(StaticConnector::new("a", vec![])));
        let names: Vec<&str> = registry.connectors().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
