use async_trait::async_trait;
use std::sync::Arc;

use super::{non_empty, sort_candidates, RecommendationStrategy, StrategyContext, TrendingStrategy};
use crate::types::{NoCandidates, ScoredCandidate, StrategyKind, StrategyOutcome};

const CATEGORY_BOOST: f64 = 0.5;
const COMMUNITY_BOOST: f64 = 0.1;

/// Trending, boosted toward the user's categories and communities.
pub struct PersonalizedTrendingStrategy {
    trending: Arc<TrendingStrategy>,
    pool_size: usize,
}

impl PersonalizedTrendingStrategy {
    pub fn new(trending: Arc<TrendingStrategy>, pool_size: usize) -> Self {
        Self {
            trending,
            pool_size,
        }
    }
}

#[async_trait]
impl RecommendationStrategy for PersonalizedTrendingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PersonalizedTrending
    }

    async fn recommend(&self, ctx: &StrategyContext) -> StrategyOutcome {
        let profile = ctx.profile.as_ref().ok_or(NoCandidates::NoProfile)?;
        let pool = self
            .trending
            .recommend(&ctx.with_limit(self.pool_size.max(ctx.limit)))
            .await?;

        let mut candidates: Vec<ScoredCandidate> = pool
            .into_iter()
            .map(|c| {
                let category = profile.category_weight(c.item.category.as_deref());
                let community = profile.community_weight(c.item.community.as_deref());
                let boosted = (c.score
                    * (1.0 + category * CATEGORY_BOOST)
                    * (1.0 + community * COMMUNITY_BOOST))
                    .min(1.0);
                let reason = match c.item.category.as_deref() {
                    Some(cat) if category > 0.0 => format!("{} (you follow {})", c.reason, cat),
                    _ => c.reason.clone(),
                };
                let mut evidence = c.supporting_evidence.clone().unwrap_or_default();
                evidence.category_match = Some(category);
                evidence.community_match = Some(community);
                ScoredCandidate::new(c.item, boosted, StrategyKind::PersonalizedTrending, reason)
                    .with_confidence(c.confidence)
                    .with_evidence(evidence)
            })
            .collect();

        sort_candidates(&mut candidates);
        candidates.truncate(ctx.limit);
        non_empty(candidates, NoCandidates::NoEligibleItems)
    }
}
