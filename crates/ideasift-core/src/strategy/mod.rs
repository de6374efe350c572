//! Ranking strategies.
//!
//! Every strategy implements [`RecommendationStrategy`] and answers with a
//! [`StrategyOutcome`]: a ranked candidate list, or the reason it has none.
//! Strategies never propagate store failures; they log them and report
//! [`NoCandidates::StoreUnavailable`].

mod collaborative;
mod content;
mod diversity;
mod engine;
mod hybrid;
mod personalized;
mod recent;
mod serendipity;
mod trending;

pub use collaborative::CollaborativeStrategy;
pub use content::ContentBasedStrategy;
pub use diversity::{mmr_select, DiversityStrategy};
pub use engine::StrategyEngine;
pub use hybrid::HybridStrategy;
pub use personalized::PersonalizedTrendingStrategy;
pub use recent::RecentStrategy;
pub use serendipity::SerendipityStrategy;
pub use trending::TrendingStrategy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use std::collections::HashSet;
use std::fmt::Display;
use tracing::warn;

use crate::traits::DataStore;
use crate::types::{Item, NoCandidates, ScoredCandidate, StrategyKind, StrategyOutcome, UserPreferenceVector};

/// Scores within this distance of a threshold count as equal to it.
pub(crate) const SCORE_EPSILON: f64 = 1e-9;

/// Default MMR trade-off when the caller gives none.
pub const DEFAULT_DIVERSITY_WEIGHT: f64 = 0.7;

/// Everything a strategy needs to know about one request.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub user_id: String,
    pub limit: usize,
    /// MMR trade-off: 1 ranks purely by relevance, 0 purely by distance.
    pub diversity_weight: f64,
    pub profile: Option<UserPreferenceVector>,
    /// Items the user has interacted with in any way.
    pub seen: HashSet<String>,
    pub now: DateTime<Utc>,
}

impl StrategyContext {
    pub fn new(user_id: impl Into<String>, limit: usize) -> Self {
        Self {
            user_id: user_id.into(),
            limit,
            diversity_weight: DEFAULT_DIVERSITY_WEIGHT,
            profile: None,
            seen: HashSet::new(),
            now: Utc::now(),
        }
    }

    pub fn with_profile(mut self, profile: Option<UserPreferenceVector>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_seen(mut self, seen: HashSet<String>) -> Self {
        self.seen = seen;
        self
    }

    pub fn with_diversity_weight(mut self, weight: f64) -> Self {
        self.diversity_weight = weight;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Same request with a different limit, for oversampling.
    pub fn with_limit(&self, limit: usize) -> Self {
        Self {
            limit,
            ..self.clone()
        }
    }
}

/// A ranking model.
#[async_trait]
pub trait RecommendationStrategy: Send + Sync {
    /// Which model this is.
    fn kind(&self) -> StrategyKind;

    /// Produce at most `ctx.limit` candidates, best first.
    async fn recommend(&self, ctx: &StrategyContext) -> StrategyOutcome;
}

/// Sort by descending score, ties by item id.
pub(crate) fn sort_candidates(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| {
        OrderedFloat(b.score)
            .cmp(&OrderedFloat(a.score))
            .then_with(|| a.item.id.cmp(&b.item.id))
    });
}

/// Log a store failure and map it to the typed no-data branch.
pub(crate) fn store_unavailable(kind: StrategyKind, user_id: &str, err: impl Display) -> NoCandidates {
    warn!(strategy = %kind, user_id, error = %err, "store read failed; strategy yields nothing");
    NoCandidates::StoreUnavailable
}

/// Recent public items the user has not seen.
pub(crate) async fn unseen_pool(
    store: &dyn DataStore,
    kind: StrategyKind,
    ctx: &StrategyContext,
    pool_size: usize,
) -> Result<Vec<Item>, NoCandidates> {
    let items = store
        .recent_public_items(pool_size)
        .await
        .map_err(|e| store_unavailable(kind, &ctx.user_id, e))?;
    let pool: Vec<Item> = items
        .into_iter()
        .filter(|i| !ctx.seen.contains(&i.id))
        .collect();
    if pool.is_empty() {
        return Err(NoCandidates::NoEligibleItems);
    }
    Ok(pool)
}

/// Turn an empty list into the given reason.
pub(crate) fn non_empty(candidates: Vec<ScoredCandidate>, reason: NoCandidates) -> StrategyOutcome {
    if candidates.is_empty() {
        Err(reason)
    } else {
        Ok(candidates)
    }
}
