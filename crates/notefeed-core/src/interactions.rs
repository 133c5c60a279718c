//! Interaction ledger: records per-user actions on topics.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::error::StoreResult;
use crate::models::Action;
use crate::store::InteractionRepository;

pub struct InteractionLedger {
    repo: Arc<dyn InteractionRepository>,
}

impl InteractionLedger {
    pub fn new(repo: Arc<dyn InteractionRepository>) -> Self {
        Self { repo }
    }

    /// Record `action`. Returns `true` when newly recorded; recording the
    /// same `(user, topic, action)` again is a no-op.
    pub async fn record(&self, user_id: &str, topic_id: &str, action: Action) -> StoreResult<bool> {
        let created = self.repo.record(user_id, topic_id, action, Utc::now()).await?;
        tracing::debug!(user_id, topic_id, %action, created, "interaction");
        Ok(created)
    }

    pub async fn query(
        &self,
        user_id: &str,
        topic_ids: &[String],
    ) -> StoreResult<HashMap<String, Vec<Action>>> {
        if topic_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.repo.actions_for(user_id, topic_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTopic;
    use crate::store::memory::InMemoryStore;
    use crate::store::TopicRepository;

    async fn store_with_topic() -> (Arc<InMemoryStore>, String) {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_topic(
                &NewTopic {
                    source: "devto".into(),
                    source_id: "1".into(),
                    title: "t".into(),
                    description: None,
                    source_url: None,
                    score: 0,
                    tags: vec![],
                    embedding: None,
                    content_hash: String::new(),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let id = store.find_by_key("devto", "1").await.unwrap().unwrap().id;
        (store, id)
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let (store, topic) = store_with_topic().await;
        let ledger = InteractionLedger::new(store.clone());
        assert!(ledger.record("u1", &topic, Action::Saved).await.unwrap());
        assert!(!ledger.record("u1", &topic, Action::Saved).await.unwrap());
        assert_eq!(store.interaction_count(), 1);
    }

    #[tokio::test]
    async fn test_query_groups_actions_per_topic() {
        let (store, topic) = store_with_topic().await;
        let ledger = InteractionLedger::new(store.clone());
        ledger.record("u1", &topic, Action::Skipped).await.unwrap();
        ledger.record("u1", &topic, Action::Viewed).await.unwrap();
        ledger.record("u2", &topic, Action::Saved).await.unwrap();

        let map = ledger.query("u1", &[topic.clone()]).await.unwrap();
        assert_eq!(map[&topic], vec![Action::Viewed, Action::Skipped]);
        assert!(ledger.query("u3", &[topic]).await.unwrap().is_empty());
        assert!(ledger.query("u1", &[]).await.unwrap().is_empty());
    }
}
