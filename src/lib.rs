//! # notefeed
//!
//! A personal knowledge-note service with a personalized AI-news feed.
//!
//! Source adapters pull AI-related items from Hacker News and Dev.to; each
//! item is translated, embedded, and upserted by `(source, source_id)`.
//! The feed ranks recent topics against the user's notes and saved topics.
//! Notes are chunked and embedded for `#tag` and semantic search and for a
//! retrieval-augmented chat.
//!
//! The domain logic lives in `notefeed-core`; this crate supplies SQLite
//! storage, the HTTP providers, the adapters, the CLI and the HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────┐
//! │ Connectors  │──▶│ Translate+Embed+Upsert│──▶│  SQLite  │
//! │ HN / Dev.to │   └──────────────────────┘   └────┬─────┘
//! └─────────────┘                                   │
//!                        ┌──────────────────────────┤
//!                        ▼                          ▼
//!                   ┌──────────┐              ┌──────────┐
//!                   │   CLI    │              │   HTTP   │
//!                   │(notefeed)│              │  (axum)  │
//!                   └──────────┘              └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and startup secrets |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core store traits |
//! | [`embedding`] | OpenAI embedding provider |
//! | [`completion`] | Anthropic completion provider |
//! | [`traits`] | Source adapter trait and registry |
//! | [`connector_hackernews`] | Hacker News adapter |
//! | [`connector_devto`] | Dev.to adapter |
//! | [`services`] | Component wiring |
//! | [`ingest`] | Ingestion cycle |
//! | [`feed`] | Feed and interaction commands |
//! | [`notes_cmd`] | Note, search, save and chat commands |
//! | [`server`] | HTTP API |

pub mod completion;
pub mod config;
pub mod connector_devto;
pub mod connector_hackernews;
pub mod db;
pub mod embedding;
pub mod feed;
pub mod ingest;
pub mod migrate;
pub mod notes_cmd;
pub mod server;
pub mod services;
pub mod sqlite_store;
pub mod traits;
