//! Component wiring.
//!
//! [`Services`] assembles every core component over one [`SqliteStore`]
//! from a loaded [`Config`] and the startup [`Secrets`]. The CLI and the
//! HTTP server both go through it, so a command and its endpoint share the
//! exact same behaviour.

use anyhow::Result;
use std::sync::Arc;

use notefeed_core::completion::CompletionProvider;
use notefeed_core::embedding::{EmbeddingGenerator, EmbeddingProvider};
use notefeed_core::interactions::InteractionLedger;
use notefeed_core::notes::NoteService;
use notefeed_core::rag::KnowledgeChat;
use notefeed_core::ranking::FeedRanker;
use notefeed_core::relevance::{BlendedRelevance, ProfileRelevanceScorer};
use notefeed_core::retention::RetentionSweeper;
use notefeed_core::sessions::ChatSessions;
use notefeed_core::stats::StatsReader;
use notefeed_core::translate::TranslationNormalizer;
use notefeed_core::upsert::TopicUpserter;

use crate::config::{Config, FeedConfig, Secrets};
use crate::sqlite_store::SqliteStore;
use crate::traits::ConnectorRegistry;
use crate::{completion, db, embedding, migrate};

/// The external capabilities, each optional.
#[derive(Clone, Default)]
pub struct Providers {
    pub embedding: Option<Arc<dyn EmbeddingProvider>>,
    pub completion: Option<Arc<dyn CompletionProvider>>,
}

impl Providers {
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Self> {
        Ok(Self {
            embedding: embedding::create_provider(&config.embedding, secrets)?,
            completion: completion::create_provider(&config.completion, secrets)?,
        })
    }
}

pub struct Services {
    pub store: Arc<SqliteStore>,
    pub registry: ConnectorRegistry,
    pub upserter: TopicUpserter,
    pub sweeper: RetentionSweeper,
    pub ranker: FeedRanker,
    pub ledger: InteractionLedger,
    pub notes: NoteService,
    pub chat: Arc<KnowledgeChat>,
    pub sessions: ChatSessions,
    pub stats: StatsReader,
    pub feed: FeedConfig,
    pub cron_secret: Option<String>,
}

impl Services {
    /// Connect to the database (creating the schema if needed), build the
    /// providers and the connector registry.
    pub async fn open(config: &Config, secrets: &Secrets) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let providers = Providers::from_config(config, secrets)?;
        tracing::info!(
            embeddings = providers.embedding.is_some(),
            completion = providers.completion.is_some(),
            "providers configured"
        );

        let registry = ConnectorRegistry::from_config(config)?;
        Ok(Self::assemble(
            config,
            Arc::new(SqliteStore::new(pool)),
            providers,
            registry,
            secrets.cron_secret.clone(),
        ))
    }

    pub fn assemble(
        config: &Config,
        store: Arc<SqliteStore>,
        providers: Providers,
        registry: ConnectorRegistry,
        cron_secret: Option<String>,
    ) -> Self {
        let embeddings = EmbeddingGenerator::from_option(providers.embedding)
            .with_max_input_chars(config.embedding.max_input_chars);

        let normalizer = if config.translation.enabled {
            TranslationNormalizer::new(
                providers.completion.clone(),
                &config.translation.target_language,
            )
        } else {
            TranslationNormalizer::passthrough()
        }
        .with_cjk_threshold(config.translation.cjk_threshold);

        let strategy = BlendedRelevance {
            similarity_weight: config.relevance.similarity_weight,
            recency_weight: config.relevance.recency_weight,
            popularity_weight: config.relevance.popularity_weight,
            half_life_hours: config.relevance.half_life_hours,
            popularity_cap: config.relevance.popularity_cap,
        };
        let scorer = ProfileRelevanceScorer::with_strategy(store.clone(), Box::new(strategy));

        let search = &config.search;
        let chat = Arc::new(
            KnowledgeChat::new(store.clone(), embeddings.clone(), providers.completion.clone())
                .with_retrieval(search.chat_threshold, search.chat_count),
        );

        Self {
            upserter: TopicUpserter::new(store.clone(), Arc::new(normalizer), embeddings.clone()),
            sweeper: RetentionSweeper::new(store.clone(), store.clone())
                .with_retention_days(config.ingest.retention_days),
            ranker: FeedRanker::new(store.clone(), Arc::new(scorer), store.clone()),
            ledger: InteractionLedger::new(store.clone()),
            notes: NoteService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                embeddings.clone(),
                providers.completion.clone(),
            )
            .with_chunk_size(search.chunk_size)
            .with_matching(search.match_threshold, search.match_count),
            sessions: ChatSessions::new(store.clone(), chat.clone()),
            stats: StatsReader::new(store.clone(), store.clone()),
            chat,
            feed: config.feed.clone(),
            registry,
            store,
            cron_secret,
        }
    }
}
