//! # notefeed core
//!
//! Runtime-agnostic logic for notefeed: data models, the line-boundary
//! chunker, embedding and translation contracts, the topic upsert/dedup
//! engine, retention, personalized ranking, the interaction ledger, note
//! retrieval, knowledge stats, and the RAG chat with persisted sessions.
//!
//! This crate contains no tokio, sqlx, or HTTP client dependencies.
//! Storage and providers are reached through the traits in [`store`],
//! [`embedding`], and [`completion`]; the `notefeed` app crate supplies the
//! SQLite store and the HTTP providers.

pub mod chunk;
pub mod completion;
pub mod embedding;
pub mod error;
pub mod interactions;
pub mod models;
pub mod notes;
pub mod rag;
pub mod ranking;
pub mod relevance;
pub mod retention;
pub mod sessions;
pub mod stats;
pub mod store;
pub mod translate;
pub mod upsert;

pub use error::{NoteError, ProviderError, StoreError, StoreResult};
pub use models::{
    Action, ChatSession, KnowledgeStats, Note, NoteMatch, RankedTopic, RawTopic, ScoredTopic,
    TagCount, Topic,
};
