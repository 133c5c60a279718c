//! Ingestion cycle orchestration.
//!
//! Runs every registered connector in order, upserts each fetched topic
//! independently, then sweeps topics past the retention horizon. Per-item
//! failures are collected into the [`IngestReport`] and never abort the
//! batch.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use notefeed_core::retention::RetentionSweeper;
use notefeed_core::upsert::TopicUpserter;

use crate::config::{Config, Secrets};
use crate::services::Services;
use crate::traits::ConnectorRegistry;

/// Outcome of one ingestion cycle, returned as JSON by the HTTP triggers.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub success: bool,
    /// Successful upserts, inserted or updated.
    pub inserted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub swept: u64,
    pub timestamp: DateTime<Utc>,
}

pub async fn fetch_and_store_topics(
    registry: &ConnectorRegistry,
    upserter: &TopicUpserter,
    sweeper: &RetentionSweeper,
) -> IngestReport {
    let mut inserted = 0usize;
    let mut errors: Vec<String> = Vec::new();

    for connector in registry.connectors() {
        let label = connector.source_label();
        let topics = connector.fetch(connector.max_items()).await;
        tracing::info!(source = %label, fetched = topics.len(), "connector fetched");

        for raw in &topics {
            match upserter.upsert(raw, connector.name()).await {
                Ok(_) => inserted += 1,
                Err(e) => {
                    tracing::warn!(source = %label, source_id = %raw.source_id, error = %e, "upsert failed");
                    errors.push(format!("{}: {}", label, e));
                }
            }
        }
    }

    let swept = match sweeper.sweep(Utc::now()).await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "retention sweep failed");
            errors.push(format!("sweep: {}", e));
            0
        }
    };

    IngestReport {
        success: true,
        inserted,
        errors: if errors.is_empty() { None } else { Some(errors) },
        swept,
        timestamp: Utc::now(),
    }
}

/// `notefeed ingest`: one cycle with a plain-text report.
pub async fn run_ingest(config: &Config, secrets: &Secrets) -> Result<()> {
    let services = Services::open(config, secrets).await?;
    if services.registry.is_empty() {
        println!("No connectors enabled.");
    }

    let report =
        fetch_and_store_topics(&services.registry, &services.upserter, &services.sweeper).await;

    println!("ingest");
    println!("  upserted topics: {}", report.inserted);
    println!("  swept topics: {}", report.swept);
    if let Some(errors) = &report.errors {
        println!("  errors: {}", errors.len());
        for e in errors {
            println!("    {}", e);
        }
    }
    println!("ok");
    Ok(())
}

/// `notefeed sweep`: retention sweep only.
pub async fn run_sweep(config: &Config, secrets: &Secrets) -> Result<()> {
    let services = Services::open(config, secrets).await?;
    let removed = services.sweeper.sweep(Utc::now()).await?;
    println!("Swept {} topic(s) older than {} days.", removed, config.ingest.retention_days);
    Ok(())
}
