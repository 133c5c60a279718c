//! Translation normalizer for topic titles and descriptions.
//!
//! Titles that are already mostly CJK are treated as being in the target
//! language and pass through without a provider call. Everything else is
//! sent to the completion provider, which must answer with a JSON object
//! `{"title": ..., "description": ...}`. Translation never fails ingestion:
//! any failure yields the original text.

use serde_json::Value;
use std::sync::Arc;

use crate::completion::{extract_json, ChatMessage, CompletionProvider};
use crate::embedding::truncate_chars;
use crate::error::ProviderError;

/// Fraction of CJK characters above which a title counts as target language.
pub const DEFAULT_CJK_THRESHOLD: f64 = 0.3;

/// Characters of `title\ndescription` sent for translation.
pub const MAX_TRANSLATION_INPUT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct Translated {
    pub title: String,
    pub description: Option<String>,
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}' | '\u{4E00}'..='\u{9FFF}')
}

/// Fraction of characters in `text` that are Hiragana, Katakana, or CJK
/// unified ideographs. Empty text has ratio 0.
pub fn cjk_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let cjk = text.chars().filter(|c| is_cjk(*c)).count();
    cjk as f64 / total as f64
}

pub struct TranslationNormalizer {
    provider: Option<Arc<dyn CompletionProvider>>,
    target_language: String,
    cjk_threshold: f64,
}

impl TranslationNormalizer {
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>, target_language: &str) -> Self {
        Self {
            provider,
            target_language: target_language.to_string(),
            cjk_threshold: DEFAULT_CJK_THRESHOLD,
        }
    }

    /// A normalizer that never translates.
    pub fn passthrough() -> Self {
        Self::new(None, "Japanese")
    }

    pub fn with_cjk_threshold(mut self, threshold: f64) -> Self {
        self.cjk_threshold = threshold;
        self
    }

    pub fn is_target_language(&self, title: &str) -> bool {
        cjk_ratio(title) > self.cjk_threshold
    }

    /// Normalize a title/description pair into the target language.
    pub async fn normalize(&self, title: &str, description: Option<&str>) -> Translated {
        self.try_normalize(title, description)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, title, "translation failed; keeping original text");
                Translated {
                    title: title.to_string(),
                    description: description.map(str::to_string),
                }
            })
    }

    /// Like [`normalize`](Self::normalize) but reports provider failures.
    ///
    /// Text already in the target language and a normalizer without a
    /// provider both yield the original text as `Ok`: nothing is left to
    /// retry for them.
    pub async fn try_normalize(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Translated, ProviderError> {
        let original = Translated {
            title: title.to_string(),
            description: description.map(str::to_string),
        };

        if self.is_target_language(title) {
            return Ok(original);
        }

        match self.translate(title, description).await {
            Err(ProviderError::NotConfigured(_)) => Ok(original),
            other => other,
        }
    }

    async fn translate(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Translated, ProviderError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured("completion".to_string()))?;

        let source_text = match description {
            Some(d) if !d.is_empty() => format!("{}\n{}", title, d),
            _ => title.to_string(),
        };
        if source_text.trim().is_empty() {
            return Ok(Translated {
                title: title.to_string(),
                description: description.map(str::to_string),
            });
        }

        let prompt = format!(
            "Translate the following text into natural {lang}. Keep technical and AI terms \
             (for example LLM, GPT, RAG) in their common {lang} form.\n\
             Reply with JSON only, no code fences:\n\
             {{\"title\":\"translated title\",\"description\":\"translated description, or null if there is none\"}}\n\n\
             Text:\n\"\"\"\n{text}\n\"\"\"",
            lang = self.target_language,
            text = truncate_chars(&source_text, MAX_TRANSLATION_INPUT_CHARS),
        );

        let reply = provider.complete(None, &[ChatMessage::user(prompt)]).await?;
        parse_translation(&reply, title, description)
    }
}

/// Parse a provider reply into a [`Translated`] pair.
///
/// A non-empty `title` replaces the original. For `description`, an omitted
/// key keeps the original, an explicit `null` means "no description", and a
/// string replaces it (blank strings count as no description).
pub fn parse_translation(
    reply: &str,
    title: &str,
    description: Option<&str>,
) -> Result<Translated, ProviderError> {
    let json = extract_json(reply);
    if json.is_empty() {
        return Err(ProviderError::InvalidResponse("empty reply".to_string()));
    }

    let value: Value = serde_json::from_str(json)
        .map_err(|e| ProviderError::InvalidResponse(format!("reply is not JSON: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ProviderError::InvalidResponse("reply is not a JSON object".to_string()))?;

    let new_title = obj
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(title)
        .to_string();

    let new_description = match obj.get("description") {
        None => description.map(str::to_string),
        Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Some(other) => Some(other.to_string()),
    };

    Ok(Translated {
        title: new_title,
        description: new_description,
    })
}
