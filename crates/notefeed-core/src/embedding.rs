//! Embedding provider trait, the degrade-to-`None` generator, and vector
//! utilities.
//!
//! Concrete providers (OpenAI) live in the `notefeed` app crate. Core code
//! only sees [`EmbeddingProvider`] and goes through [`EmbeddingGenerator`],
//! which truncates input to the provider's character budget and turns every
//! provider failure into `None`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ProviderError;

/// Vector dimensionality of stored embeddings.
pub const EMBEDDING_DIMS: usize = 1536;

/// Input character budget applied before every provider call.
pub const MAX_EMBED_INPUT_CHARS: usize = 8000;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Converts text into vectors, or `None` when no vector is available.
///
/// A generator without a provider is "disabled": every call yields `None`
/// and [`is_enabled`](Self::is_enabled) reports `false`, which lets callers
/// that strictly need vectors report the capability as unavailable.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    max_input_chars: usize,
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider: Some(provider),
            max_input_chars: MAX_EMBED_INPUT_CHARS,
        }
    }

    pub fn disabled() -> Self {
        Self {
            provider: None,
            max_input_chars: MAX_EMBED_INPUT_CHARS,
        }
    }

    /// Build from an optional provider (e.g. the result of config wiring).
    pub fn from_option(provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        match provider {
            Some(p) => Self::new(p),
            None => Self::disabled(),
        }
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn model_name(&self) -> &str {
        self.provider
            .as_ref()
            .map(|p| p.model_name())
            .unwrap_or("disabled")
    }

    /// Embed `text`, returning `None` on any failure.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.try_embed(text).await {
            Ok(v) => Some(v),
            Err(ProviderError::NotConfigured(_)) => None,
            Err(e) => {
                tracing::warn!(error = %e, model = self.model_name(), "embedding failed");
                None
            }
        }
    }

    /// Embed `text`, keeping the provider error.
    ///
    /// The input is silently truncated to the character budget. A vector
    /// whose length differs from the provider's declared dimensionality is
    /// rejected as an invalid response.
    pub async fn try_embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured("embedding".to_string()))?;

        let input = truncate_chars(text, self.max_input_chars);
        let vector = provider.embed(input).await?;

        if vector.len() != provider.dims() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                provider.dims(),
                vector.len()
            )));
        }
        Ok(vector)
    }
}

/// Return the prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use notefeed_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Deterministic provider for tests: the vector depends on which
    /// keywords the text contains, so related texts are similar.
    pub struct KeywordEmbedder {
        pub dims: usize,
        pub fail: AtomicBool,
        pub calls: Mutex<Vec<String>>,
    }

    impl KeywordEmbedder {
        pub fn new(dims: usize) -> Self {
            Self {
                dims,
                fail: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(dims: usize) -> Self {
            Self {
                fail: AtomicBool::new(true),
                ..Self::new(dims)
            }
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    pub const KEYWORDS: [&str; 4] = ["llm", "rust", "cooking", "gpu"];

    pub fn keyword_vector(text: &str, dims: usize) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v = vec![0.0f32; dims];
        for (i, kw) in KEYWORDS.iter().enumerate() {
            if lower.contains(kw) {
                v[i % dims] += 1.0;
            }
        }
        v[dims - 1] += 0.1;
        v
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword-test"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.lock().unwrap().push(text.to_string());
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProviderError::Status {
                    status: 429,
                    body: "rate limited".into(),
                });
            }
            Ok(keyword_vector(text, self.dims))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::KeywordEmbedder;
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_truncate_chars_on_char_boundary() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }

    #[tokio::test]
    async fn test_generator_truncates_input() {
        let provider = Arc::new(KeywordEmbedder::new(4));
        let generator = EmbeddingGenerator::new(provider.clone()).with_max_input_chars(5);
        let v = generator.embed("abcdefghij").await;
        assert!(v.is_some());
        assert_eq!(provider.calls.lock().unwrap()[0], "abcde");
    }

    #[tokio::test]
    async fn test_default_budget_is_8000_chars() {
        let provider = Arc::new(KeywordEmbedder::new(4));
        let generator = EmbeddingGenerator::new(provider.clone());
        let long = "x".repeat(9000);
        generator.embed(&long).await;
        assert_eq!(provider.calls.lock().unwrap()[0].chars().count(), 8000);
    }

    #[tokio::test]
    async fn test_provider_error_becomes_none() {
        let generator = EmbeddingGenerator::new(Arc::new(KeywordEmbedder::failing(4)));
        assert!(generator.embed("llm news").await.is_none());
        assert!(matches!(
            generator.try_embed("llm news").await,
            Err(ProviderError::Status { status: 429, .. })
        ));
    }

    #[tokio::test]
    async fn test_disabled_generator() {
        let generator = EmbeddingGenerator::disabled();
        assert!(!generator.is_enabled());
        assert_eq!(generator.model_name(), "disabled");
        assert!(generator.embed("anything").await.is_none());
        assert!(matches!(
            generator.try_embed("anything").await,
            Err(ProviderError::NotConfigured(_))
        ));
    }

    struct WrongDims;

    #[async_trait]
    impl EmbeddingProvider for WrongDims {
        fn model_name(&self) -> &str {
            "wrong"
        }
        fn dims(&self) -> usize {
            EMBEDDING_DIMS
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![1.0; 3])
        }
    }

    #[tokio::test]
    async fn test_wrong_dimensionality_rejected() {
        let generator = EmbeddingGenerator::new(Arc::new(WrongDims));
        assert!(generator.embed("text").await.is_none());
    }
}
