//! Storage abstraction for notefeed.
//!
//! One repository trait per entity replaces an untyped datastore handle.
//! The SQLite store in the `notefeed` app crate and the [`memory`] store
//! both implement every trait here, so core components can be built over
//! either backend.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Trait | Entity |
//! |-------|--------|
//! | [`TopicRepository`] | Ingested topics, keyed by `(source, source_id)` |
//! | [`InteractionRepository`] | Per-user actions on topics |
//! | [`ProfileStore`] | Inputs for personalized relevance |
//! | [`RelevanceScorer`] | The "score topics for a user" capability |
//! | [`NoteRepository`] | Notes, note tags, and note chunk vectors |
//! | [`ChatRepository`] | Chat sessions and their messages |

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::completion::ChatMessage;
use crate::error::StoreResult;
use crate::models::{
    Action, ChatSession, NewTopic, Note, NoteMatch, ScoredTopic, TagCount, Topic, UpsertOutcome,
};

#[async_trait]
pub trait TopicRepository: Send + Sync {
    /// Look up a topic by its dedup key.
    async fn find_by_key(&self, source: &str, source_id: &str) -> StoreResult<Option<Topic>>;

    /// Insert or update by `(source, source_id)`.
    ///
    /// On update the title, description, URL, score, tags, and content hash
    /// are overwritten, the embedding only when `topic.embedding` is `Some`,
    /// `fetched_at` is set to `now`, and `created_at` is preserved.
    ///
    /// Backends that can race on insert return
    /// [`StoreError::UniqueViolation`](crate::StoreError::UniqueViolation).
    async fn upsert_topic(&self, topic: &NewTopic, now: DateTime<Utc>)
        -> StoreResult<UpsertOutcome>;

    async fn get_topic(&self, id: &str) -> StoreResult<Option<Topic>>;

    /// Topics fetched at or after `since`, ordered by score desc then
    /// `fetched_at` desc.
    async fn recent_by_score(&self, since: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Topic>>;

    /// Delete topics fetched strictly before `cutoff`; returns their ids.
    async fn delete_fetched_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>>;
}

#[async_trait]
pub trait InteractionRepository: Send + Sync {
    /// Record an action. Returns `false` when the triple already existed.
    ///
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound) when
    /// the topic does not exist.
    async fn record(
        &self,
        user_id: &str,
        topic_id: &str,
        action: Action,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Actions of `user_id` on each of `topic_ids`. Topics without actions
    /// are absent from the map; action lists are sorted.
    async fn actions_for(
        &self,
        user_id: &str,
        topic_ids: &[String],
    ) -> StoreResult<HashMap<String, Vec<Action>>>;

    /// Delete every interaction on the given topics, for all users.
    async fn delete_for_topics(&self, topic_ids: &[String]) -> StoreResult<u64>;

    /// Number of topics on which `user_id` recorded `action`.
    async fn count_actions(&self, user_id: &str, action: Action) -> StoreResult<u64>;
}

/// Read access needed to personalize the feed.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Vectors describing the user's interests: their note chunk
    /// embeddings plus the embeddings of topics they saved.
    async fn profile_vectors(&self, user_id: &str) -> StoreResult<Vec<Vec<f32>>>;

    /// Embedded topics fetched at or after `since` that the user has not
    /// skipped.
    async fn candidate_topics(&self, user_id: &str, since: DateTime<Utc>)
        -> StoreResult<Vec<Topic>>;
}

/// Personalized relevance for a user's feed.
///
/// May legitimately return zero rows (e.g. a new user with no profile); the
/// ranker then falls back to popularity.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score_topics(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ScoredTopic>>;
}

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn insert_note(&self, note: &Note) -> StoreResult<()>;

    /// Fetch a note owned by `user_id`.
    async fn get_note(&self, user_id: &str, note_id: &str) -> StoreResult<Option<Note>>;

    /// Replace every stored `(chunk, vector)` pair of a note.
    async fn replace_note_embeddings(
        &self,
        note_id: &str,
        chunks: &[(String, Vec<f32>)],
    ) -> StoreResult<()>;

    /// Chunks of the user's notes with cosine similarity `>= threshold`,
    /// best first, at most `count`.
    async fn match_note_embeddings(
        &self,
        user_id: &str,
        query: &[f32],
        threshold: f64,
        count: usize,
    ) -> StoreResult<Vec<NoteMatch>>;

    /// The user's notes carrying tag `tag`, newest first.
    async fn notes_with_tag(&self, user_id: &str, tag: &str, limit: usize)
        -> StoreResult<Vec<Note>>;

    /// Attach tag `tag` to a note, creating the user's tag if needed.
    async fn tag_note(
        &self,
        user_id: &str,
        note_id: &str,
        tag: &str,
        color: Option<&str>,
    ) -> StoreResult<()>;

    /// The user's tags with the number of notes carrying each, most used
    /// first, ties by name.
    async fn tag_counts(&self, user_id: &str) -> StoreResult<Vec<TagCount>>;

    async fn count_notes(&self, user_id: &str) -> StoreResult<u64>;

    /// Number of the user's notes with at least one stored chunk vector.
    async fn count_embedded_notes(&self, user_id: &str) -> StoreResult<u64>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_session(&self, session: &ChatSession) -> StoreResult<()>;

    /// Fetch a session owned by `user_id`.
    async fn get_session(&self, user_id: &str, session_id: &str)
        -> StoreResult<Option<ChatSession>>;

    async fn append_message(
        &self,
        session_id: &str,
        message: &ChatMessage,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Messages of a session, oldest first.
    async fn session_messages(&self, session_id: &str) -> StoreResult<Vec<ChatMessage>>;

    /// Delete a session owned by `user_id` together with its messages.
    /// Returns `false` when there was no such session.
    async fn delete_session(&self, user_id: &str, session_id: &str) -> StoreResult<bool>;
}
