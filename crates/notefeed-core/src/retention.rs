//! Retention sweeper: deletes topics older than the retention horizon.
//!
//! Interactions on swept topics are deleted in the same pass so that no
//! interaction outlives its topic.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::StoreResult;
use crate::store::{InteractionRepository, TopicRepository};

pub const DEFAULT_RETENTION_DAYS: i64 = 7;

pub struct RetentionSweeper {
    topics: Arc<dyn TopicRepository>,
    interactions: Arc<dyn InteractionRepository>,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(
        topics: Arc<dyn TopicRepository>,
        interactions: Arc<dyn InteractionRepository>,
    ) -> Self {
        Self {
            topics,
            interactions,
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
        }
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention = Duration::days(days);
        self
    }

    /// Delete topics whose `fetched_at` is strictly before `now - retention`.
    /// Returns the number of topics deleted.
    pub async fn sweep(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let cutoff = now - self.retention;
        let removed = self.topics.delete_fetched_before(cutoff).await?;
        if removed.is_empty() {
            return Ok(0);
        }

        let cascaded = self.interactions.delete_for_topics(&removed).await?;
        tracing::info!(
            topics = removed.len(),
            interactions = cascaded,
            %cutoff,
            "retention sweep"
        );
        Ok(removed.len() as u64)
    }
}
