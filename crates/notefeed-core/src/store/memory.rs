//! In-memory implementation of every repository trait, for tests and
//! embedded use.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Vector matching is
//! brute-force cosine similarity over all stored vectors.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::completion::ChatMessage;
use crate::embedding::cosine_similarity;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Action, ChatSession, Interaction, NewTopic, Note, NoteMatch, TagCount, Topic, UpsertOutcome,
};

use super::{ChatRepository, InteractionRepository, NoteRepository, ProfileStore, TopicRepository};

struct StoredChunk {
    note_id: String,
    content: String,
    vector: Vec<f32>,
}

struct NoteTag {
    user_id: String,
    note_id: String,
    tag: String,
    color: Option<String>,
}

struct StoredMessage {
    session_id: String,
    message: ChatMessage,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    topics: RwLock<HashMap<String, Topic>>,
    interactions: RwLock<Vec<Interaction>>,
    notes: RwLock<HashMap<String, Note>>,
    chunks: RwLock<Vec<StoredChunk>>,
    note_tags: RwLock<Vec<NoteTag>>,
    sessions: RwLock<HashMap<String, ChatSession>>,
    messages: RwLock<Vec<StoredMessage>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored topic's `fetched_at`. Used to age rows in tests.
    pub fn set_fetched_at(&self, topic_id: &str, fetched_at: DateTime<Utc>) -> StoreResult<()> {
        let mut topics = self.topics.write().map_err(poisoned)?;
        let topic = topics
            .get_mut(topic_id)
            .ok_or_else(|| StoreError::NotFound(format!("topic {}", topic_id)))?;
        topic.fetched_at = fetched_at;
        Ok(())
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions.read().map(|i| i.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Backend(anyhow::anyhow!("in-memory store lock poisoned"))
}

fn by_score_then_fresh(a: &Topic, b: &Topic) -> std::cmp::Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.fetched_at.cmp(&a.fetched_at))
}

#[async_trait]
impl TopicRepository for InMemoryStore {
    async fn find_by_key(&self, source: &str, source_id: &str) -> StoreResult<Option<Topic>> {
        let topics = self.topics.read().map_err(poisoned)?;
        Ok(topics
            .values()
            .find(|t| t.source == source && t.source_id == source_id)
            .cloned())
    }

    async fn upsert_topic(
        &self,
        topic: &NewTopic,
        now: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome> {
        let mut topics = self.topics.write().map_err(poisoned)?;

        if let Some(existing) = topics
            .values_mut()
            .find(|t| t.source == topic.source && t.source_id == topic.source_id)
        {
            existing.title = topic.title.clone();
            existing.description = topic.description.clone();
            existing.source_url = topic.source_url.clone();
            existing.score = topic.score;
            existing.tags = topic.tags.clone();
            existing.content_hash = topic.content_hash.clone();
            if topic.embedding.is_some() {
                existing.embedding = topic.embedding.clone();
            }
            existing.fetched_at = now;
            return Ok(UpsertOutcome::Updated);
        }

        let id = Uuid::new_v4().to_string();
        topics.insert(
            id.clone(),
            Topic {
                id,
                title: topic.title.clone(),
                description: topic.description.clone(),
                source_url: topic.source_url.clone(),
                source: topic.source.clone(),
                source_id: topic.source_id.clone(),
                score: topic.score,
                tags: topic.tags.clone(),
                embedding: topic.embedding.clone(),
                content_hash: topic.content_hash.clone(),
                fetched_at: now,
                created_at: now,
            },
        );
        Ok(UpsertOutcome::Inserted)
    }

    async fn get_topic(&self, id: &str) -> StoreResult<Option<Topic>> {
        let topics = self.topics.read().map_err(poisoned)?;
        Ok(topics.get(id).cloned())
    }

    async fn recent_by_score(&self, since: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Topic>> {
        let topics = self.topics.read().map_err(poisoned)?;
        let mut rows: Vec<Topic> = topics
            .values()
            .filter(|t| t.fetched_at >= since)
            .cloned()
            .collect();
        rows.sort_by(by_score_then_fresh);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn delete_fetched_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let mut topics = self.topics.write().map_err(poisoned)?;
        let expired: Vec<String> = topics
            .values()
            .filter(|t| t.fetched_at < cutoff)
            .map(|t| t.id.clone())
            .collect();
        for id in &expired {
            topics.remove(id);
        }
        Ok(expired)
    }
}

#[async_trait]
impl InteractionRepository for InMemoryStore {
    async fn record(
        &self,
        user_id: &str,
        topic_id: &str,
        action: Action,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if !self.topics.read().map_err(poisoned)?.contains_key(topic_id) {
            return Err(StoreError::NotFound(format!("topic {}", topic_id)));
        }

        let mut interactions = self.interactions.write().map_err(poisoned)?;
        let exists = interactions
            .iter()
            .any(|i| i.user_id == user_id && i.topic_id == topic_id && i.action == action);
        if exists {
            return Ok(false);
        }
        interactions.push(Interaction {
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
            action,
            created_at: now,
        });
        Ok(true)
    }

    async fn actions_for(
        &self,
        user_id: &str,
        topic_ids: &[String],
    ) -> StoreResult<HashMap<String, Vec<Action>>> {
        let wanted: HashSet<&str> = topic_ids.iter().map(String::as_str).collect();
        let interactions = self.interactions.read().map_err(poisoned)?;

        let mut out: HashMap<String, Vec<Action>> = HashMap::new();
        for i in interactions
            .iter()
            .filter(|i| i.user_id == user_id && wanted.contains(i.topic_id.as_str()))
        {
            out.entry(i.topic_id.clone()).or_default().push(i.action);
        }
        for actions in out.values_mut() {
            actions.sort();
        }
        Ok(out)
    }

    async fn delete_for_topics(&self, topic_ids: &[String]) -> StoreResult<u64> {
        let doomed: HashSet<&str> = topic_ids.iter().map(String::as_str).collect();
        let mut interactions = self.interactions.write().map_err(poisoned)?;
        let before = interactions.len();
        interactions.retain(|i| !doomed.contains(i.topic_id.as_str()));
        Ok((before - interactions.len()) as u64)
    }

    async fn count_actions(&self, user_id: &str, action: Action) -> StoreResult<u64> {
        let interactions = self.interactions.read().map_err(poisoned)?;
        Ok(interactions
            .iter()
            .filter(|i| i.user_id == user_id && i.action == action)
            .count() as u64)
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn profile_vectors(&self, user_id: &str) -> StoreResult<Vec<Vec<f32>>> {
        let notes = self.notes.read().map_err(poisoned)?;
        let chunks = self.chunks.read().map_err(poisoned)?;
        let mut vectors: Vec<Vec<f32>> = chunks
            .iter()
            .filter(|c| notes.get(&c.note_id).is_some_and(|n| n.user_id == user_id))
            .map(|c| c.vector.clone())
            .collect();

        let interactions = self.interactions.read().map_err(poisoned)?;
        let topics = self.topics.read().map_err(poisoned)?;
        vectors.extend(
            interactions
                .iter()
                .filter(|i| i.user_id == user_id && i.action == Action::Saved)
                .filter_map(|i| topics.get(&i.topic_id))
                .filter_map(|t| t.embedding.clone()),
        );
        Ok(vectors)
    }

    async fn candidate_topics(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Topic>> {
        let interactions = self.interactions.read().map_err(poisoned)?;
        let skipped: HashSet<&str> = interactions
            .iter()
            .filter(|i| i.user_id == user_id && i.action == Action::Skipped)
            .map(|i| i.topic_id.as_str())
            .collect();

        let topics = self.topics.read().map_err(poisoned)?;
        Ok(topics
            .values()
            .filter(|t| t.fetched_at >= since && t.embedding.is_some())
            .filter(|t| !skipped.contains(t.id.as_str()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NoteRepository for InMemoryStore {
    async fn insert_note(&self, note: &Note) -> StoreResult<()> {
        let mut notes = self.notes.write().map_err(poisoned)?;
        if notes.contains_key(&note.id) {
            return Err(StoreError::UniqueViolation(format!("note {}", note.id)));
        }
        notes.insert(note.id.clone(), note.clone());
        Ok(())
    }

    async fn get_note(&self, user_id: &str, note_id: &str) -> StoreResult<Option<Note>> {
        let notes = self.notes.read().map_err(poisoned)?;
        Ok(notes
            .get(note_id)
            .filter(|n| n.user_id == user_id)
            .cloned())
    }

    async fn replace_note_embeddings(
        &self,
        note_id: &str,
        chunks: &[(String, Vec<f32>)],
    ) -> StoreResult<()> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        stored.retain(|c| c.note_id != note_id);
        stored.extend(chunks.iter().map(|(content, vector)| StoredChunk {
            note_id: note_id.to_string(),
            content: content.clone(),
            vector: vector.clone(),
        }));
        Ok(())
    }

    async fn match_note_embeddings(
        &self,
        user_id: &str,
        query: &[f32],
        threshold: f64,
        count: usize,
    ) -> StoreResult<Vec<NoteMatch>> {
        let notes = self.notes.read().map_err(poisoned)?;
        let chunks = self.chunks.read().map_err(poisoned)?;

        let mut matches: Vec<NoteMatch> = chunks
            .iter()
            .filter(|c| notes.get(&c.note_id).is_some_and(|n| n.user_id == user_id))
            .map(|c| NoteMatch {
                note_id: c.note_id.clone(),
                content: c.content.clone(),
                similarity: cosine_similarity(query, &c.vector) as f64,
            })
            .filter(|m| m.similarity >= threshold)
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(count);
        Ok(matches)
    }

    async fn notes_with_tag(
        &self,
        user_id: &str,
        tag: &str,
        limit: usize,
    ) -> StoreResult<Vec<Note>> {
        let notes = self.notes.read().map_err(poisoned)?;
        let note_tags = self.note_tags.read().map_err(poisoned)?;

        let mut rows: Vec<Note> = note_tags
            .iter()
            .filter(|nt| nt.user_id == user_id && nt.tag == tag)
            .filter_map(|nt| notes.get(&nt.note_id))
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn tag_note(
        &self,
        user_id: &str,
        note_id: &str,
        tag: &str,
        color: Option<&str>,
    ) -> StoreResult<()> {
        if self.get_note(user_id, note_id).await?.is_none() {
            return Err(StoreError::NotFound(format!("note {}", note_id)));
        }
        let mut note_tags = self.note_tags.write().map_err(poisoned)?;
        let exists = note_tags
            .iter()
            .any(|nt| nt.user_id == user_id && nt.note_id == note_id && nt.tag == tag);
        if !exists {
            note_tags.push(NoteTag {
                user_id: user_id.to_string(),
                note_id: note_id.to_string(),
                tag: tag.to_string(),
                color: color.map(str::to_string),
            });
        }
        Ok(())
    }

    async fn tag_counts(&self, user_id: &str) -> StoreResult<Vec<TagCount>> {
        let note_tags = self.note_tags.read().map_err(poisoned)?;
        let mut counts: HashMap<&str, TagCount> = HashMap::new();
        for nt in note_tags.iter().filter(|nt| nt.user_id == user_id) {
            let entry = counts.entry(nt.tag.as_str()).or_insert_with(|| TagCount {
                name: nt.tag.clone(),
                color: None,
                note_count: 0,
            });
            entry.note_count += 1;
            if entry.color.is_none() {
                entry.color = nt.color.clone();
            }
        }
        let mut rows: Vec<TagCount> = counts.into_values().collect();
        rows.sort_by(|a, b| {
            b.note_count
                .cmp(&a.note_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(rows)
    }

    async fn count_notes(&self, user_id: &str) -> StoreResult<u64> {
        let notes = self.notes.read().map_err(poisoned)?;
        Ok(notes.values().filter(|n| n.user_id == user_id).count() as u64)
    }

    async fn count_embedded_notes(&self, user_id: &str) -> StoreResult<u64> {
        let notes = self.notes.read().map_err(poisoned)?;
        let chunks = self.chunks.read().map_err(poisoned)?;
        let embedded: HashSet<&str> = chunks
            .iter()
            .filter(|c| notes.get(&c.note_id).is_some_and(|n| n.user_id == user_id))
            .map(|c| c.note_id.as_str())
            .collect();
        Ok(embedded.len() as u64)
    }
}

#[async_trait]
impl ChatRepository for InMemoryStore {
    async fn create_session(&self, session: &ChatSession) -> StoreResult<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::UniqueViolation(format!("chat session {}", session.id)));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> StoreResult<Option<ChatSession>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions
            .get(session_id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn append_message(
        &self,
        session_id: &str,
        message: &ChatMessage,
        _now: DateTime<Utc>,
    ) -> StoreResult<()> {
        if !self.sessions.read().map_err(poisoned)?.contains_key(session_id) {
            return Err(StoreError::NotFound(format!("chat session {}", session_id)));
        }
        self.messages.write().map_err(poisoned)?.push(StoredMessage {
            session_id: session_id.to_string(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn session_messages(&self, session_id: &str) -> StoreResult<Vec<ChatMessage>> {
        let messages = self.messages.read().map_err(poisoned)?;
        Ok(messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .map(|m| m.message.clone())
            .collect())
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> StoreResult<bool> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        if !sessions.get(session_id).is_some_and(|s| s.user_id == user_id) {
            return Ok(false);
        }
        sessions.remove(session_id);
        self.messages
            .write()
            .map_err(poisoned)?
            .retain(|m| m.session_id != session_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_topic(source_id: &str, score: i64, embedding: Option<Vec<f32>>) -> NewTopic {
        NewTopic {
            source: "devto".into(),
            source_id: source_id.into(),
            title: format!("Topic {}", source_id),
            description: None,
            source_url: None,
            score,
            tags: vec![],
            embedding,
            content_hash: "h".into(),
        }
    }

    fn note(id: &str, user: &str) -> Note {
        Note {
            id: id.into(),
            user_id: user.into(),
            title: "t".into(),
            content: "c".into(),
            summary: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_embedding_when_absent() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .upsert_topic(&new_topic("1", 5, Some(vec![1.0, 0.0])), now)
            .await
            .unwrap();
        let outcome = store
            .upsert_topic(&new_topic("1", 9, None), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let t = store.find_by_key("devto", "1").await.unwrap().unwrap();
        assert_eq!(t.score, 9);
        assert_eq!(t.embedding, Some(vec![1.0, 0.0]));
        assert_eq!(t.created_at, now);
        assert_eq!(t.fetched_at, now + Duration::hours(1));
        assert_eq!(store.topic_count(), 1);
    }

    #[tokio::test]
    async fn test_recent_by_score_orders_and_filters() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.upsert_topic(&new_topic("a", 3, None), now).await.unwrap();
        store.upsert_topic(&new_topic("b", 10, None), now).await.unwrap();
        store.upsert_topic(&new_topic("old", 99, None), now).await.unwrap();
        let old = store.find_by_key("devto", "old").await.unwrap().unwrap();
        store.set_fetched_at(&old.id, now - Duration::hours(72)).unwrap();

        let rows = store
            .recent_by_score(now - Duration::hours(48), 10)
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|t| t.source_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_record_requires_topic() {
        let store = InMemoryStore::new();
        let err = store
            .record("u1", "missing", Action::Viewed, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_candidates_exclude_skipped_and_unembedded() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .upsert_topic(&new_topic("keep", 1, Some(vec![1.0])), now)
            .await
            .unwrap();
        store
            .upsert_topic(&new_topic("skip", 1, Some(vec![1.0])), now)
            .await
            .unwrap();
        store.upsert_topic(&new_topic("bare", 1, None), now).await.unwrap();
        let skip = store.find_by_key("devto", "skip").await.unwrap().unwrap();
        store.record("u1", &skip.id, Action::Skipped, now).await.unwrap();

        let rows = store
            .candidate_topics("u1", now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_id, "keep");

        let other = store
            .candidate_topics("u2", now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(other.len(), 2);
    }

    #[tokio::test]
    async fn test_match_note_embeddings_scoped_to_user() {
        let store = InMemoryStore::new();
        store.insert_note(&note("n1", "u1")).await.unwrap();
        store.insert_note(&note("n2", "u2")).await.unwrap();
        store
            .replace_note_embeddings("n1", &[("mine".into(), vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .replace_note_embeddings("n2", &[("theirs".into(), vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store
            .match_note_embeddings("u1", &[1.0, 0.0], 0.3, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "mine");

        let none = store
            .match_note_embeddings("u1", &[0.0, 1.0], 0.3, 10)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_replace_note_embeddings_replaces() {
        let store = InMemoryStore::new();
        store.insert_note(&note("n1", "u1")).await.unwrap();
        store
            .replace_note_embeddings("n1", &[("a".into(), vec![1.0]), ("b".into(), vec![1.0])])
            .await
            .unwrap();
        store
            .replace_note_embeddings("n1", &[("c".into(), vec![1.0])])
            .await
            .unwrap();
        let hits = store
            .match_note_embeddings("u1", &[1.0], 0.0, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "c");
    }

    #[tokio::test]
    async fn test_tag_note_is_idempotent() {
        let store = InMemoryStore::new();
        store.insert_note(&note("n1", "u1")).await.unwrap();
        store.tag_note("u1", "n1", "rust", None).await.unwrap();
        store.tag_note("u1", "n1", "rust", None).await.unwrap();
        assert_eq!(store.notes_with_tag("u1", "rust", 10).await.unwrap().len(), 1);
        assert!(store.notes_with_tag("u2", "rust", 10).await.unwrap().is_empty());
        assert!(store.tag_note("u2", "n1", "rust", None).await.is_err());
    }
}
