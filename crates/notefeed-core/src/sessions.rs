//! Persisted chat sessions.
//!
//! A session stores every user message and assistant reply. Each new
//! message is answered by [`KnowledgeChat`] with the session's stored
//! messages as history, so clients only send the new message.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::completion::ChatMessage;
use crate::error::{StoreError, StoreResult};
use crate::models::ChatSession;
use crate::rag::KnowledgeChat;
use crate::store::ChatRepository;

pub struct ChatSessions {
    repo: Arc<dyn ChatRepository>,
    chat: Arc<KnowledgeChat>,
}

impl ChatSessions {
    pub fn new(repo: Arc<dyn ChatRepository>, chat: Arc<KnowledgeChat>) -> Self {
        Self { repo, chat }
    }

    pub async fn create(&self, user_id: &str) -> StoreResult<ChatSession> {
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        };
        self.repo.create_session(&session).await?;
        tracing::debug!(user_id, session_id = %session.id, "chat session created");
        Ok(session)
    }

    /// Stored messages of a session owned by `user_id`, oldest first.
    pub async fn history(&self, user_id: &str, session_id: &str) -> StoreResult<Vec<ChatMessage>> {
        self.require(user_id, session_id).await?;
        self.repo.session_messages(session_id).await
    }

    /// Answer `message` within a session and store both turns.
    pub async fn send(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> StoreResult<String> {
        self.require(user_id, session_id).await?;
        let history = self.repo.session_messages(session_id).await?;

        self.repo
            .append_message(session_id, &ChatMessage::user(message), Utc::now())
            .await?;
        let reply = self.chat.answer(user_id, message, &history).await;
        self.repo
            .append_message(session_id, &ChatMessage::assistant(reply.as_str()), Utc::now())
            .await?;
        Ok(reply)
    }

    pub async fn delete(&self, user_id: &str, session_id: &str) -> StoreResult<bool> {
        self.repo.delete_session(user_id, session_id).await
    }

    async fn require(&self, user_id: &str, session_id: &str) -> StoreResult<ChatSession> {
        self.repo
            .get_session(user_id, session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("chat session {}", session_id)))
    }
}
