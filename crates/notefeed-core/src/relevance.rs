//! Personalized relevance scoring.
//!
//! [`ProfileRelevanceScorer`] implements [`RelevanceScorer`] over any
//! [`ProfileStore`]. The user's profile is the set of vectors describing
//! their interests; each candidate topic is scored by a
//! [`RelevanceStrategy`].
//!
//! The default [`BlendedRelevance`] mixes three signals, each in `[0, 1]`:
//!
//! ```text
//! relevance = w_sim * similarity + w_rec * recency + w_pop * popularity
//!
//! similarity = clamp(max cosine(topic, profile_vector), 0, 1)
//! recency    = 0.5 ^ (age_hours / half_life_hours)
//! popularity = clamp(ln(1 + score) / ln(1 + popularity_cap), 0, 1)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::embedding::cosine_similarity;
use crate::error::StoreResult;
use crate::models::{ScoredTopic, Topic};
use crate::store::{ProfileStore, RelevanceScorer};

/// Scores one candidate topic against a non-empty user profile.
pub trait RelevanceStrategy: Send + Sync {
    fn score(&self, topic: &Topic, profile: &[Vec<f32>], now: DateTime<Utc>) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct BlendedRelevance {
    pub similarity_weight: f64,
    pub recency_weight: f64,
    pub popularity_weight: f64,
    pub half_life_hours: f64,
    pub popularity_cap: f64,
}

impl Default for BlendedRelevance {
    fn default() -> Self {
        Self {
            similarity_weight: 0.7,
            recency_weight: 0.2,
            popularity_weight: 0.1,
            half_life_hours: 24.0,
            popularity_cap: 500.0,
        }
    }
}

impl BlendedRelevance {
    pub fn similarity(topic: &Topic, profile: &[Vec<f32>]) -> f64 {
        let Some(embedding) = topic.embedding.as_deref() else {
            return 0.0;
        };
        profile
            .iter()
            .map(|p| cosine_similarity(embedding, p) as f64)
            .fold(0.0, f64::max)
            .clamp(0.0, 1.0)
    }

    pub fn recency(&self, topic: &Topic, now: DateTime<Utc>) -> f64 {
        let age_hours = (now - topic.fetched_at).num_seconds().max(0) as f64 / 3600.0;
        if self.half_life_hours <= 0.0 {
            return 0.0;
        }
        0.5f64.powf(age_hours / self.half_life_hours)
    }

    pub fn popularity(&self, topic: &Topic) -> f64 {
        if self.popularity_cap <= 0.0 {
            return 0.0;
        }
        let score = topic.score.max(0) as f64;
        ((1.0 + score).ln() / (1.0 + self.popularity_cap).ln()).clamp(0.0, 1.0)
    }
}

impl RelevanceStrategy for BlendedRelevance {
    fn score(&self, topic: &Topic, profile: &[Vec<f32>], now: DateTime<Utc>) -> f64 {
        let total = self.similarity_weight + self.recency_weight + self.popularity_weight;
        if total <= 0.0 {
            return 0.0;
        }
        let blended = self.similarity_weight * Self::similarity(topic, profile)
            + self.recency_weight * self.recency(topic, now)
            + self.popularity_weight * self.popularity(topic);
        (blended / total).clamp(0.0, 1.0)
    }
}

/// [`RelevanceScorer`] backed by a [`ProfileStore`].
///
/// Returns zero rows for a user with an empty profile.
pub struct ProfileRelevanceScorer {
    store: Arc<dyn ProfileStore>,
    strategy: Box<dyn RelevanceStrategy>,
}

impl ProfileRelevanceScorer {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self::with_strategy(store, Box::new(BlendedRelevance::default()))
    }

    pub fn with_strategy(store: Arc<dyn ProfileStore>, strategy: Box<dyn RelevanceStrategy>) -> Self {
        Self { store, strategy }
    }
}

#[async_trait]
impl RelevanceScorer for ProfileRelevanceScorer {
    async fn score_topics(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ScoredTopic>> {
        let profile = self.store.profile_vectors(user_id).await?;
        if profile.is_empty() {
            tracing::debug!(user_id, "empty profile; no personalized scores");
            return Ok(Vec::new());
        }

        let candidates = self.store.candidate_topics(user_id, since).await?;
        let mut scored: Vec<ScoredTopic> = candidates
            .into_iter()
            .map(|topic| {
                let relevance_score = self.strategy.score(&topic, &profile, now);
                ScoredTopic {
                    topic,
                    relevance_score,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.topic.fetched_at.cmp(&a.topic.fetched_at))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}
