//! Retrieval-augmented chat over a user's notes.

use std::sync::Arc;

use crate::completion::{ChatMessage, CompletionProvider, Role};
use crate::embedding::EmbeddingGenerator;
use crate::store::NoteRepository;

pub const DEFAULT_CONTEXT_THRESHOLD: f64 = 0.25;
pub const DEFAULT_CONTEXT_COUNT: usize = 5;
pub const MAX_HISTORY_MESSAGES: usize = 10;
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub const NOT_CONFIGURED_REPLY: &str =
    "The assistant is not configured. Set a completion API key to enable chat.";
pub const FAILED_REPLY: &str = "The assistant could not answer right now. Please try again later.";

pub struct KnowledgeChat {
    notes: Arc<dyn NoteRepository>,
    embeddings: EmbeddingGenerator,
    completion: Option<Arc<dyn CompletionProvider>>,
    threshold: f64,
    count: usize,
}

impl KnowledgeChat {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        embeddings: EmbeddingGenerator,
        completion: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        Self {
            notes,
            embeddings,
            completion,
            threshold: DEFAULT_CONTEXT_THRESHOLD,
            count: DEFAULT_CONTEXT_COUNT,
        }
    }

    pub fn with_retrieval(mut self, threshold: f64, count: usize) -> Self {
        self.threshold = threshold;
        self.count = count;
        self
    }

    /// Answer `message` using the user's notes as context. Never fails;
    /// problems are reported in the returned text.
    pub async fn answer(&self, user_id: &str, message: &str, history: &[ChatMessage]) -> String {
        let Some(provider) = self.completion.as_ref() else {
            return NOT_CONFIGURED_REPLY.to_string();
        };

        let context = self.retrieve_context(user_id, message).await;
        let system = system_prompt(&context);

        let mut messages = recent_history(history);
        messages.push(ChatMessage::user(message));

        match provider.complete(Some(&system), &messages).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, user_id, "chat completion failed");
                FAILED_REPLY.to_string()
            }
        }
    }

    /// Matching note chunks joined by [`CONTEXT_SEPARATOR`]; empty when
    /// embeddings are unavailable or nothing matches.
    pub async fn retrieve_context(&self, user_id: &str, message: &str) -> String {
        if !self.embeddings.is_enabled() {
            return String::new();
        }
        let Some(vector) = self.embeddings.embed(message).await else {
            return String::new();
        };
        match self
            .notes
            .match_note_embeddings(user_id, &vector, self.threshold, self.count)
            .await
        {
            Ok(matches) => matches
                .into_iter()
                .map(|m| m.content)
                .collect::<Vec<_>>()
                .join(CONTEXT_SEPARATOR),
            Err(e) => {
                tracing::warn!(error = %e, user_id, "note retrieval failed");
                String::new()
            }
        }
    }
}

/// The last [`MAX_HISTORY_MESSAGES`] turns, starting at a user turn: the
/// messages API rejects a conversation that opens with the assistant.
fn recent_history(history: &[ChatMessage]) -> Vec<ChatMessage> {
    let skip = history.len().saturating_sub(MAX_HISTORY_MESSAGES);
    history[skip..]
        .iter()
        .skip_while(|m| m.role == Role::Assistant)
        .cloned()
        .collect()
}

fn system_prompt(context: &str) -> String {
    let context = if context.is_empty() {
        "(no related notes)"
    } else {
        context
    };
    format!(
        "You are a knowledge assistant answering from the user's own notes.\n\
         The reference notes below are excerpts related to the question. Base your answer on them.\n\
         If they do not cover the question, say that no matching information was found in the notes.\n\
         Keep answers concise and well structured.\n\n\
         [Reference notes]\n{}",
        context
    )
}
