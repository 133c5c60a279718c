//! Per-user knowledge-base summary.

use std::sync::Arc;

use crate::error::StoreResult;
use crate::models::{Action, KnowledgeStats};
use crate::store::{InteractionRepository, NoteRepository};

pub struct StatsReader {
    notes: Arc<dyn NoteRepository>,
    interactions: Arc<dyn InteractionRepository>,
}

impl StatsReader {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        interactions: Arc<dyn InteractionRepository>,
    ) -> Self {
        Self {
            notes,
            interactions,
        }
    }

    /// Tag distribution, note counts and saved-topic count for `user_id`.
    pub async fn collect(&self, user_id: &str) -> StoreResult<KnowledgeStats> {
        Ok(KnowledgeStats {
            tag_stats: self.notes.tag_counts(user_id).await?,
            total_notes: self.notes.count_notes(user_id).await?,
            embedded_notes: self.notes.count_embedded_notes(user_id).await?,
            saved_topics: self
                .interactions
                .count_actions(user_id, Action::Saved)
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTopic, Note, TagCount};
    use crate::store::memory::InMemoryStore;
    use crate::store::TopicRepository;
    use chrono::Utc;

    fn note(id: &str, user: &str) -> Note {
        Note {
            id: id.into(),
            user_id: user.into(),
            title: format!("note {}", id),
            content: "content".into(),
            summary: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_empty_user_has_zero_stats() {
        let store = Arc::new(InMemoryStore::new());
        let stats = StatsReader::new(store.clone(), store).collect("u1").await.unwrap();
        assert!(stats.tag_stats.is_empty());
        assert_eq!(stats.total_notes, 0);
        assert_eq!(stats.embedded_notes, 0);
        assert_eq!(stats.saved_topics, 0);
    }

    #[tokio::test]
    async fn test_collect_counts_only_the_users_data() {
        let store = Arc::new(InMemoryStore::new());
        for id in ["n1", "n2", "n3"] {
            store.insert_note(&note(id, "u1")).await.unwrap();
        }
        store.insert_note(&note("other", "u2")).await.unwrap();

        store.tag_note("u1", "n1", "rust", None).await.unwrap();
        store.tag_note("u1", "n2", "rust", None).await.unwrap();
        store
            .tag_note("u1", "n2", "discovery", Some("#4f9cf9"))
            .await
            .unwrap();
        store.tag_note("u2", "other", "rust", None).await.unwrap();

        store
            .replace_note_embeddings("n1", &[("a".into(), vec![1.0]), ("b".into(), vec![0.5])])
            .await
            .unwrap();
        store
            .replace_note_embeddings("other", &[("c".into(), vec![1.0])])
            .await
            .unwrap();

        let now = Utc::now();
        store
            .upsert_topic(
                &NewTopic {
                    source: "hackernews".into(),
                    source_id: "1".into(),
                    title: "t".into(),
                    description: None,
                    source_url: None,
                    score: 1,
                    tags: vec![],
                    embedding: None,
                    content_hash: "h".into(),
                },
                now,
            )
            .await
            .unwrap();
        let topic_id = store.find_by_key("hackernews", "1").await.unwrap().unwrap().id;
        store.record("u1", &topic_id, Action::Saved, now).await.unwrap();
        store.record("u1", &topic_id, Action::Viewed, now).await.unwrap();
        store.record("u2", &topic_id, Action::Saved, now).await.unwrap();

        let stats = StatsReader::new(store.clone(), store).collect("u1").await.unwrap();
        assert_eq!(
            stats.tag_stats,
            vec![
                TagCount {
                    name: "rust".into(),
                    color: None,
                    note_count: 2
                },
                TagCount {
                    name: "discovery".into(),
                    color: Some("#4f9cf9".into()),
                    note_count: 1
                },
            ]
        );
        assert_eq!(stats.total_notes, 3);
        assert_eq!(stats.embedded_notes, 1);
        assert_eq!(stats.saved_topics, 1);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalNotes"], 3);
        assert_eq!(json["tagStats"][0]["noteCount"], 2);
    }
}
