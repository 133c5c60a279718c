//! Text-completion provider contract.
//!
//! A single call, `complete(system, messages) -> text`, backs translation,
//! note titling/summaries, and the RAG chat. Callers truncate their input
//! before calling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => anyhow::bail!("unknown chat role: '{}'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError>;
}

/// Strip a Markdown code fence (```` ```json ... ``` ````) around a JSON reply.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[open + 3..];
    let body = after_fence
        .strip_prefix("json")
        .unwrap_or(after_fence);
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => trimmed,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json("  {\"a\":1} \n"), "{\"a\":1}");
    }

    #[test]
    fn test_extract_json_fenced() {
        let text = "```json\n{\"title\":\"x\"}\n```";
        assert_eq!(extract_json(text), "{\"title\":\"x\"}");
        let bare = "Here you go:\n```\n{\"title\":\"y\"}\n```";
        assert_eq!(extract_json(bare), "{\"title\":\"y\"}");
    }

    #[test]
    fn test_extract_json_unclosed_fence_returns_input() {
        assert_eq!(extract_json("```json {"), "```json {");
    }

    #[test]
    fn test_chat_message_serde() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
