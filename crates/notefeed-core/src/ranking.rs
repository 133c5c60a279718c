//! Personalized feed ranking with a popularity fallback.
//!
//! The primary path asks the [`RelevanceScorer`] for personalized scores.
//! When scoring fails or yields nothing (a new user, no embeddings yet),
//! the feed falls back to the most popular recent topics with a relevance
//! of zero. Either way every row is annotated with the user's recorded
//! actions in a single batched lookup.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::StoreResult;
use crate::models::{Action, RankedTopic, ScoredTopic};
use crate::store::{InteractionRepository, RelevanceScorer, TopicRepository};

pub const DEFAULT_FEED_WINDOW_HOURS: i64 = 48;
pub const DEFAULT_FEED_LIMIT: usize = 20;

pub struct FeedRanker {
    topics: Arc<dyn TopicRepository>,
    scorer: Arc<dyn RelevanceScorer>,
    interactions: Arc<dyn InteractionRepository>,
}

impl FeedRanker {
    pub fn new(
        topics: Arc<dyn TopicRepository>,
        scorer: Arc<dyn RelevanceScorer>,
        interactions: Arc<dyn InteractionRepository>,
    ) -> Self {
        Self {
            topics,
            scorer,
            interactions,
        }
    }

    /// Rank topics fetched within `since` of `now` for `user_id`.
    ///
    /// The relevance scorer already leaves out topics the user skipped, so
    /// the primary path never returns them. When scoring fails or yields
    /// nothing, the popularity fallback lists every recent topic and skipped
    /// ones come back annotated with `skipped`; callers filter them with
    /// [`drop_skipped`].
    pub async fn rank(
        &self,
        user_id: &str,
        since: Duration,
        limit: usize,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<RankedTopic>> {
        let window_start = now - since;

        let scored = match self
            .scorer
            .score_topics(user_id, window_start, limit, now)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, user_id, "relevance scoring failed; using popularity fallback");
                Vec::new()
            }
        };

        let mut rows = if scored.is_empty() {
            self.topics
                .recent_by_score(window_start, limit)
                .await?
                .into_iter()
                .map(|topic| ScoredTopic {
                    topic,
                    relevance_score: 0.0,
                })
                .collect()
        } else {
            let mut scored = scored;
            scored.sort_by(|a, b| {
                b.relevance_score
                    .partial_cmp(&a.relevance_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.topic.fetched_at.cmp(&a.topic.fetched_at))
            });
            scored
        };
        rows.truncate(limit);

        let ids: Vec<String> = rows.iter().map(|r| r.topic.id.clone()).collect();
        let mut actions = if ids.is_empty() {
            Default::default()
        } else {
            self.interactions.actions_for(user_id, &ids).await?
        };

        Ok(rows
            .into_iter()
            .map(|r| {
                let user_actions = actions.remove(&r.topic.id).unwrap_or_default();
                RankedTopic {
                    topic: r.topic,
                    relevance_score: r.relevance_score,
                    user_actions,
                }
            })
            .collect())
    }
}

/// Remove topics the user has skipped.
pub fn drop_skipped(feed: Vec<RankedTopic>) -> Vec<RankedTopic> {
    feed.into_iter()
        .filter(|t| !t.has_action(Action::Skipped))
        .collect()
}
