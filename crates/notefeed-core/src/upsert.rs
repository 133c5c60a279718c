//! Topic upsert/dedup engine.
//!
//! Persists one [`RawTopic`] as a durable topic keyed by
//! `(source, source_id)`. A re-observed item whose raw content has not
//! changed keeps its stored translation and embedding; otherwise it is
//! normalized and embedded again before the write.
//!
//! The content hash is only stored once a row is complete: translated (or
//! needing no translation) and embedded (or embeddings disabled). A row
//! whose translation or embedding failed is stored with an empty hash, so
//! the next cycle runs both steps again.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingGenerator;
use crate::error::{StoreError, StoreResult};
use crate::models::{clean_tags, NewTopic, RawTopic, UpsertOutcome};
use crate::store::TopicRepository;
use crate::translate::{Translated, TranslationNormalizer};

pub struct TopicUpserter {
    topics: Arc<dyn TopicRepository>,
    normalizer: Arc<TranslationNormalizer>,
    embeddings: EmbeddingGenerator,
}

impl TopicUpserter {
    pub fn new(
        topics: Arc<dyn TopicRepository>,
        normalizer: Arc<TranslationNormalizer>,
        embeddings: EmbeddingGenerator,
    ) -> Self {
        Self {
            topics,
            normalizer,
            embeddings,
        }
    }

    /// Upsert `raw` under `source`.
    ///
    /// A unique-key violation from the store means another writer inserted
    /// the same key first; it is reported as [`UpsertOutcome::Updated`].
    pub async fn upsert(&self, raw: &RawTopic, source: &str) -> StoreResult<UpsertOutcome> {
        let hash = content_hash(raw);
        let existing = self.topics.find_by_key(source, &raw.source_id).await?;

        let reusable = existing.filter(|stored| {
            stored.content_hash == hash
                && (stored.embedding.is_some() || !self.embeddings.is_enabled())
        });

        let (title, description, embedding, complete) = match reusable {
            Some(stored) => {
                tracing::debug!(source, source_id = %raw.source_id, "content unchanged; reusing translation");
                (stored.title, stored.description, stored.embedding, true)
            }
            None => {
                let (translated, translated_ok) = match self
                    .normalizer
                    .try_normalize(&raw.title, raw.description.as_deref())
                    .await
                {
                    Ok(t) => (t, true),
                    Err(e) => {
                        tracing::warn!(source, source_id = %raw.source_id, error = %e, "translation failed; keeping original text");
                        (
                            Translated {
                                title: raw.title.clone(),
                                description: raw.description.clone(),
                            },
                            false,
                        )
                    }
                };
                let input = embedding_input(&translated.title, translated.description.as_deref());
                let embedding = self.embeddings.embed(&input).await;
                let embedded_ok = embedding.is_some() || !self.embeddings.is_enabled();
                (
                    translated.title,
                    translated.description,
                    embedding,
                    translated_ok && embedded_ok,
                )
            }
        };

        let topic = NewTopic {
            source: source.to_string(),
            source_id: raw.source_id.clone(),
            title,
            description,
            source_url: raw.source_url.clone(),
            score: raw.score.max(0),
            tags: clean_tags(raw.tags.iter().cloned()),
            embedding,
            content_hash: if complete { hash } else { String::new() },
        };

        match self.topics.upsert_topic(&topic, Utc::now()).await {
            Ok(outcome) => Ok(outcome),
            Err(StoreError::UniqueViolation(key)) => {
                tracing::debug!(%key, "concurrent insert; treating as update");
                Ok(UpsertOutcome::Updated)
            }
            Err(e) => Err(e),
        }
    }
}

/// Text embedded for a topic: `title. description`, or just the title.
pub fn embedding_input(title: &str, description: Option<&str>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!("{}. {}", title, d),
        _ => title.to_string(),
    }
}

/// SHA-256 over the raw title and description, hex encoded.
pub fn content_hash(raw: &RawTopic) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.title.as_bytes());
    hasher.update([0u8]);
    if let Some(d) = &raw.description {
        hasher.update(d.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
