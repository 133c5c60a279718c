//! SQLite-backed implementation of the core repository traits.
//!
//! Wraps a [`SqlitePool`] and maps every trait method onto the schema
//! created by [`migrate`](crate::migrate). Topic upserts are a single
//! `INSERT ... ON CONFLICT(source, source_id) DO UPDATE` statement, so
//! concurrent writers of the same key converge without a unique-violation
//! error. Note vector matching is brute-force cosine similarity over the
//! user's stored chunk vectors.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use notefeed_core::completion::{ChatMessage, Role};
use notefeed_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use notefeed_core::models::{
    Action, ChatSession, NewTopic, Note, NoteMatch, TagCount, Topic, UpsertOutcome,
};
use notefeed_core::store::{
    ChatRepository, InteractionRepository, NoteRepository, ProfileStore, TopicRepository,
};
use notefeed_core::{StoreError, StoreResult};

const TOPIC_COLUMNS: &str = "id, source, source_id, title, description, source_url, score, \
                             tags_json, embedding, content_hash, fetched_at, created_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return StoreError::NotFound(db.message().to_string());
        }
    }
    StoreError::Backend(e.into())
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn row_to_topic(row: &SqliteRow) -> StoreResult<Topic> {
    let tags_json: String = row.try_get("tags_json").map_err(db_err)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let embedding: Option<Vec<u8>> = row.try_get("embedding").map_err(db_err)?;

    Ok(Topic {
        id: row.try_get("id").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        source_url: row.try_get("source_url").map_err(db_err)?,
        source: row.try_get("source").map_err(db_err)?,
        source_id: row.try_get("source_id").map_err(db_err)?,
        score: row.try_get("score").map_err(db_err)?,
        tags,
        embedding: embedding.map(|b| blob_to_vec(&b)),
        content_hash: row.try_get("content_hash").map_err(db_err)?,
        fetched_at: from_millis(row.try_get("fetched_at").map_err(db_err)?),
        created_at: from_millis(row.try_get("created_at").map_err(db_err)?),
    })
}

fn row_to_note(row: &SqliteRow) -> StoreResult<Note> {
    Ok(Note {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        content: row.try_get("content").map_err(db_err)?,
        summary: row.try_get("summary").map_err(db_err)?,
        created_at: from_millis(row.try_get("created_at").map_err(db_err)?),
    })
}

#[async_trait]
impl TopicRepository for SqliteStore {
    async fn find_by_key(&self, source: &str, source_id: &str) -> StoreResult<Option<Topic>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM topics WHERE source = ? AND source_id = ?",
            TOPIC_COLUMNS
        ))
        .bind(source)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_topic).transpose()
    }

    async fn upsert_topic(
        &self,
        topic: &NewTopic,
        now: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome> {
        let new_id = Uuid::new_v4().to_string();
        let tags_json = serde_json::to_string(&topic.tags)
            .map_err(|e| StoreError::Backend(e.into()))?;
        let ts = to_millis(now);

        let stored_id: String = sqlx::query_scalar(
            r#"
            INSERT INTO topics (id, source, source_id, title, description, source_url, score,
                                tags_json, embedding, content_hash, fetched_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, source_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                source_url = excluded.source_url,
                score = excluded.score,
                tags_json = excluded.tags_json,
                embedding = COALESCE(excluded.embedding, topics.embedding),
                content_hash = excluded.content_hash,
                fetched_at = excluded.fetched_at
            RETURNING id
            "#,
        )
        .bind(&new_id)
        .bind(&topic.source)
        .bind(&topic.source_id)
        .bind(&topic.title)
        .bind(&topic.description)
        .bind(&topic.source_url)
        .bind(topic.score)
        .bind(&tags_json)
        .bind(topic.embedding.as_deref().map(vec_to_blob))
        .bind(&topic.content_hash)
        .bind(ts)
        .bind(ts)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(if stored_id == new_id {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn get_topic(&self, id: &str) -> StoreResult<Option<Topic>> {
        let row = sqlx::query(&format!("SELECT {} FROM topics WHERE id = ?", TOPIC_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_topic).transpose()
    }

    async fn recent_by_score(&self, since: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Topic>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM topics WHERE fetched_at >= ? \
             ORDER BY score DESC, fetched_at DESC LIMIT ?",
            TOPIC_COLUMNS
        ))
        .bind(to_millis(since))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_topic).collect()
    }

    async fn delete_fetched_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        sqlx::query_scalar("DELETE FROM topics WHERE fetched_at < ? RETURNING id")
            .bind(to_millis(cutoff))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl InteractionRepository for SqliteStore {
    async fn record(
        &self,
        user_id: &str,
        topic_id: &str,
        action: Action,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO interactions (user_id, topic_id, action, created_at)
            SELECT ?, id, ?, ? FROM topics WHERE id = ?
            ON CONFLICT(user_id, topic_id, action) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(action.as_str())
        .bind(to_millis(now))
        .bind(topic_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM topics WHERE id = ?")
            .bind(topic_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::NotFound(format!("topic {}", topic_id)))
        }
    }

    async fn actions_for(
        &self,
        user_id: &str,
        topic_ids: &[String],
    ) -> StoreResult<HashMap<String, Vec<Action>>> {
        let mut out: HashMap<String, Vec<Action>> = HashMap::new();
        if topic_ids.is_empty() {
            return Ok(out);
        }

        let sql = format!(
            "SELECT topic_id, action FROM interactions WHERE user_id = ? AND topic_id IN ({})",
            placeholders(topic_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(user_id);
        for id in topic_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;

        for row in rows {
            let topic_id: String = row.try_get("topic_id").map_err(db_err)?;
            let action: String = row.try_get("action").map_err(db_err)?;
            match action.parse::<Action>() {
                Ok(a) => out.entry(topic_id).or_default().push(a),
                Err(e) => tracing::warn!(%topic_id, error = %e, "ignoring unknown stored action"),
            }
        }
        for actions in out.values_mut() {
            actions.sort();
        }
        Ok(out)
    }

    async fn delete_for_topics(&self, topic_ids: &[String]) -> StoreResult<u64> {
        if topic_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM interactions WHERE topic_id IN ({})",
            placeholders(topic_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in topic_ids {
            query = query.bind(id);
        }
        let result = query.execute(&self.pool).await.map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn count_actions(&self, user_id: &str, action: Action) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM interactions WHERE user_id = ? AND action = ?")
                .bind(user_id)
                .bind(action.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn profile_vectors(&self, user_id: &str) -> StoreResult<Vec<Vec<f32>>> {
        let blobs: Vec<Vec<u8>> = sqlx::query_scalar(
            r#"
            SELECT ne.embedding FROM note_embeddings ne
            JOIN notes n ON n.id = ne.note_id
            WHERE n.user_id = ?
            UNION ALL
            SELECT t.embedding FROM interactions i
            JOIN topics t ON t.id = i.topic_id
            WHERE i.user_id = ? AND i.action = 'saved' AND t.embedding IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(blobs.iter().map(|b| blob_to_vec(b)).collect())
    }

    async fn candidate_topics(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Topic>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM topics t
            WHERE t.fetched_at >= ? AND t.embedding IS NOT NULL
              AND NOT EXISTS (
                SELECT 1 FROM interactions i
                WHERE i.topic_id = t.id AND i.user_id = ? AND i.action = 'skipped'
              )
            "#,
            TOPIC_COLUMNS
        ))
        .bind(to_millis(since))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_topic).collect()
    }
}

#[async_trait]
impl NoteRepository for SqliteStore {
    async fn insert_note(&self, note: &Note) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO notes (id, user_id, title, content, summary, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&note.id)
        .bind(&note.user_id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(&note.summary)
        .bind(to_millis(note.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_note(&self, user_id: &str, note_id: &str) -> StoreResult<Option<Note>> {
        let row = sqlx::query(
            "SELECT id, user_id, title, content, summary, created_at \
             FROM notes WHERE id = ? AND user_id = ?",
        )
        .bind(note_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_note).transpose()
    }

    async fn replace_note_embeddings(
        &self,
        note_id: &str,
        chunks: &[(String, Vec<f32>)],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM note_embeddings WHERE note_id = ?")
            .bind(note_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for (content, vector) in chunks {
            sqlx::query(
                "INSERT INTO note_embeddings (note_id, content, embedding) VALUES (?, ?, ?)",
            )
            .bind(note_id)
            .bind(content)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn match_note_embeddings(
        &self,
        user_id: &str,
        query: &[f32],
        threshold: f64,
        count: usize,
    ) -> StoreResult<Vec<NoteMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT ne.note_id, ne.content, ne.embedding
            FROM note_embeddings ne
            JOIN notes n ON n.id = ne.note_id
            WHERE n.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut matches = Vec::new();
        for row in rows {
            let blob: Vec<u8> = row.try_get("embedding").map_err(db_err)?;
            let similarity = cosine_similarity(query, &blob_to_vec(&blob)) as f64;
            if similarity >= threshold {
                matches.push(NoteMatch {
                    note_id: row.try_get("note_id").map_err(db_err)?,
                    content: row.try_get("content").map_err(db_err)?,
                    similarity,
                });
            }
        }
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
        let rows = sqlx::query(
            r#"
            SELECT n.id, n.user_id, n.title, n.content, n.summary, n.created_at
            FROM notes n
            JOIN note_tags nt ON nt.note_id = n.id
            JOIN tags t ON t.id = nt.tag_id
            WHERE t.user_id = ? AND t.name = ? AND n.user_id = ?
            ORDER BY n.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(tag)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_note).collect()
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

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO tags (id, user_id, name, color) VALUES (?, ?, ?, ?) \
             ON CONFLICT(user_id, name) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(tag)
        .bind(color)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let tag_id: String = sqlx::query_scalar("SELECT id FROM tags WHERE user_id = ? AND name = ?")
            .bind(user_id)
            .bind(tag)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?, ?)")
            .bind(note_id)
            .bind(&tag_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn tag_counts(&self, user_id: &str) -> StoreResult<Vec<TagCount>> {
        let rows = sqlx::query(
            r#"
            SELECT t.name, t.color, COUNT(n.id) AS note_count
            FROM tags t
            JOIN note_tags nt ON nt.tag_id = t.id
            JOIN notes n ON n.id = nt.note_id AND n.user_id = t.user_id
            WHERE t.user_id = ?
            GROUP BY t.id
            ORDER BY note_count DESC, t.name ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| -> StoreResult<TagCount> {
                let count: i64 = row.try_get("note_count").map_err(db_err)?;
                Ok(TagCount {
                    name: row.try_get("name").map_err(db_err)?,
                    color: row.try_get("color").map_err(db_err)?,
                    note_count: count as u64,
                })
            })
            .collect()
    }

    async fn count_notes(&self, user_id: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn count_embedded_notes(&self, user_id: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT ne.note_id)
            FROM note_embeddings ne
            JOIN notes n ON n.id = ne.note_id
            WHERE n.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ChatRepository for SqliteStore {
    async fn create_session(&self, session: &ChatSession) -> StoreResult<()> {
        sqlx::query("INSERT INTO chat_sessions (id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&session.id)
            .bind(&session.user_id)
            .bind(to_millis(session.created_at))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> StoreResult<Option<ChatSession>> {
        let row = sqlx::query(
            "SELECT id, user_id, created_at FROM chat_sessions WHERE id = ? AND user_id = ?",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|row| -> StoreResult<ChatSession> {
            Ok(ChatSession {
                id: row.try_get("id").map_err(db_err)?,
                user_id: row.try_get("user_id").map_err(db_err)?,
                created_at: from_millis(row.try_get("created_at").map_err(db_err)?),
            })
        })
        .transpose()
    }

    async fn append_message(
        &self,
        session_id: &str,
        message: &ChatMessage,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO chat_messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(to_millis(now))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn session_messages(&self, session_id: &str) -> StoreResult<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT role, content FROM chat_messages WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.try_get("role").map_err(db_err)?;
            let role = role.parse::<Role>().map_err(StoreError::Backend)?;
            messages.push(ChatMessage {
                role,
                content: row.try_get("content").map_err(db_err)?,
            });
        }
        Ok(messages)
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ? AND user_id = ?")
            .bind(session_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM chat_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Duration;

    async fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("data").join("notefeed.sqlite");
        let pool = crate::db::connect(&config).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn new_topic(source_id: &str, score: i64, embedding: Option<Vec<f32>>) -> NewTopic {
        NewTopic {
            source: "devto".into(),
            source_id: source_id.into(),
            title: format!("Topic {}", source_id),
            description: Some("desc".into()),
            source_url: Some(format!("https://dev.to/{}", source_id)),
            score,
            tags: vec!["ai".into(), "rust".into()],
            embedding,
            content_hash: "hash".into(),
        }
    }

    fn note(id: &str, user: &str) -> Note {
        Note {
            id: id.into(),
            user_id: user.into(),
            title: "title".into(),
            content: "content".into(),
            summary: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (_tmp, store) = test_store().await;
        crate::migrate::apply(store.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_insert_then_update() {
        let (_tmp, store) = test_store().await;
        let t0 = Utc::now() - Duration::hours(2);
        let t1 = Utc::now();

        let first = store
            .upsert_topic(&new_topic("7", 7, Some(vec![0.5, 0.5])), t0)
            .await
            .unwrap();
        assert_eq!(first, UpsertOutcome::Inserted);

        let second = store.upsert_topic(&new_topic("7", 19, None), t1).await.unwrap();
        assert_eq!(second, UpsertOutcome::Updated);

        let t = store.find_by_key("devto", "7").await.unwrap().unwrap();
        assert_eq!(t.score, 19);
        assert_eq!(t.tags, vec!["ai", "rust"]);
        assert_eq!(t.embedding, Some(vec![0.5, 0.5]));
        assert_eq!(t.created_at.timestamp_millis(), t0.timestamp_millis());
        assert_eq!(t.fetched_at.timestamp_millis(), t1.timestamp_millis());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topics")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_recent_by_score_and_delete() {
        let (_tmp, store) = test_store().await;
        let now = Utc::now();
        store.upsert_topic(&new_topic("low", 1, None), now).await.unwrap();
        store.upsert_topic(&new_topic("high", 50, None), now).await.unwrap();
        store
            .upsert_topic(&new_topic("old", 99, None), now - Duration::days(8))
            .await
            .unwrap();

        let recent = store
            .recent_by_score(now - Duration::hours(48), 10)
            .await
            .unwrap();
        let ids: Vec<&str> = recent.iter().map(|t| t.source_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);

        let deleted = store
            .delete_fetched_before(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert!(store.find_by_key("devto", "old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_interactions_idempotent_and_validated() {
        let (_tmp, store) = test_store().await;
        let now = Utc::now();
        store.upsert_topic(&new_topic("1", 1, None), now).await.unwrap();
        let id = store.find_by_key("devto", "1").await.unwrap().unwrap().id;

        assert!(store.record("u1", &id, Action::Saved, now).await.unwrap());
        assert!(!store.record("u1", &id, Action::Saved, now).await.unwrap());
        assert!(store.record("u1", &id, Action::Viewed, now).await.unwrap());
        assert!(matches!(
            store.record("u1", "missing", Action::Saved, now).await,
            Err(StoreError::NotFound(_))
        ));

        let map = store.actions_for("u1", &[id.clone()]).await.unwrap();
        assert_eq!(map[&id], vec![Action::Viewed, Action::Saved]);
        assert!(store.actions_for("u2", &[id.clone()]).await.unwrap().is_empty());

        assert_eq!(store.delete_for_topics(&[id]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_profile_and_candidates() {
        let (_tmp, store) = test_store().await;
        let now = Utc::now();
        store
            .upsert_topic(&new_topic("saved", 1, Some(vec![1.0, 0.0])), now)
            .await
            .unwrap();
        store
            .upsert_topic(&new_topic("skipped", 1, Some(vec![0.0, 1.0])), now)
            .await
            .unwrap();
        store.upsert_topic(&new_topic("bare", 1, None), now).await.unwrap();
        let saved = store.find_by_key("devto", "saved").await.unwrap().unwrap().id;
        let skipped = store.find_by_key("devto", "skipped").await.unwrap().unwrap().id;
        store.record("u1", &saved, Action::Saved, now).await.unwrap();
        store.record("u1", &skipped, Action::Skipped, now).await.unwrap();

        store.insert_note(&note("n1", "u1")).await.unwrap();
        store
            .replace_note_embeddings("n1", &[("chunk".into(), vec![0.3, 0.7])])
            .await
            .unwrap();

        let profile = store.profile_vectors("u1").await.unwrap();
        assert_eq!(profile.len(), 2);
        assert!(store.profile_vectors("u2").await.unwrap().is_empty());

        let candidates = store
            .candidate_topics("u1", now - Duration::hours(1))
            .await
            .unwrap();
        let ids: Vec<&str> = candidates.iter().map(|t| t.source_id.as_str()).collect();
        assert_eq!(ids, vec!["saved"]);
    }

    #[tokio::test]
    async fn test_note_embeddings_and_tags() {
        let (_tmp, store) = test_store().await;
        store.insert_note(&note("n1", "u1")).await.unwrap();
        store.insert_note(&note("n2", "u2")).await.unwrap();
        assert!(matches!(
            store.insert_note(&note("n1", "u1")).await,
            Err(StoreError::UniqueViolation(_))
        ));

        store
            .replace_note_embeddings(
                "n1",
                &[("near".into(), vec![1.0, 0.0]), ("far".into(), vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        store
            .replace_note_embeddings("n2", &[("other user".into(), vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store
            .match_note_embeddings("u1", &[1.0, 0.0], 0.3, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "near");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);

        store.tag_note("u1", "n1", "discovery", Some("#4f9cf9")).await.unwrap();
        store.tag_note("u1", "n1", "discovery", None).await.unwrap();
        let tagged = store.notes_with_tag("u1", "discovery", 10).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, "n1");
        assert!(store.notes_with_tag("u2", "discovery", 10).await.unwrap().is_empty());
        assert!(matches!(
            store.tag_note("u2", "n1", "x", None).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let (_tmp, store) = test_store().await;
        let now = Utc::now();
        store.insert_note(&note("n1", "u1")).await.unwrap();
        store.insert_note(&note("n2", "u1")).await.unwrap();
        store.insert_note(&note("n3", "u2")).await.unwrap();
        store.tag_note("u1", "n1", "rust", None).await.unwrap();
        store.tag_note("u1", "n2", "rust", None).await.unwrap();
        store.tag_note("u1", "n2", "discovery", Some("#4f9cf9")).await.unwrap();
        store.tag_note("u2", "n3", "rust", None).await.unwrap();
        store
            .replace_note_embeddings("n2", &[("a".into(), vec![1.0]), ("b".into(), vec![0.0])])
            .await
            .unwrap();

        let tags = store.tag_counts("u1").await.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!((tags[0].name.as_str(), tags[0].note_count), ("rust", 2));
        assert_eq!(tags[1].color.as_deref(), Some("#4f9cf9"));
        assert_eq!(store.count_notes("u1").await.unwrap(), 2);
        assert_eq!(store.count_embedded_notes("u1").await.unwrap(), 1);
        assert_eq!(store.count_embedded_notes("u2").await.unwrap(), 0);

        store.upsert_topic(&new_topic("1", 1, None), now).await.unwrap();
        let id = store.find_by_key("devto", "1").await.unwrap().unwrap().id;
        store.record("u1", &id, Action::Saved, now).await.unwrap();
        store.record("u1", &id, Action::Viewed, now).await.unwrap();
        assert_eq!(store.count_actions("u1", Action::Saved).await.unwrap(), 1);
        assert_eq!(store.count_actions("u2", Action::Saved).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chat_sessions_roundtrip() {
        let (_tmp, store) = test_store().await;
        let now = Utc::now();
        let session = ChatSession {
            id: "s1".into(),
            user_id: "u1".into(),
            created_at: now,
        };
        store.create_session(&session).await.unwrap();
        assert!(store.get_session("u2", "s1").await.unwrap().is_none());
        assert_eq!(
            store.get_session("u1", "s1").await.unwrap().map(|s| s.id),
            Some("s1".to_string())
        );

        store.append_message("s1", &ChatMessage::user("q"), now).await.unwrap();
        store.append_message("s1", &ChatMessage::assistant("a"), now).await.unwrap();
        let messages = store.session_messages("s1").await.unwrap();
        assert_eq!(messages, vec![ChatMessage::user("q"), ChatMessage::assistant("a")]);

        // Messages need an existing session
        assert!(matches!(
            store.append_message("missing", &ChatMessage::user("q"), now).await,
            Err(StoreError::NotFound(_))
        ));

        assert!(!store.delete_session("u2", "s1").await.unwrap());
        assert!(store.delete_session("u1", "s1").await.unwrap());
        assert!(store.session_messages("s1").await.unwrap().is_empty());
    }
}
