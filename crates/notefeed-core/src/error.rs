//! Error types shared across the core crate.
//!
//! Provider failures are modeled as [`ProviderError`] internally; the
//! components that call providers degrade them to `None` or to the original
//! text at their public boundary. [`StoreError`] keeps the unique-constraint
//! case distinguishable so the upsert engine can treat it as an update.

/// Failure of an upstream embedding or completion call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Failure of a repository operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A natural unique key (e.g. `(source, source_id)`) was already present.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by note indexing and search.
#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    /// No embedding provider is configured, so semantic operations cannot run.
    #[error("embedding service unavailable")]
    EmbeddingsUnavailable,
    /// The provider is configured but did not return a vector for the query.
    #[error("failed to generate embedding")]
    EmbeddingFailed,
    #[error(transparent)]
    Store(#[from] StoreError),
}
