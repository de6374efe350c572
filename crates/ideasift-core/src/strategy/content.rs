use async_trait::async_trait;
use std::sync::Arc;

use super::{
    non_empty, sort_candidates, unseen_pool, RecommendationStrategy, StrategyContext,
    SCORE_EPSILON,
};
use crate::traits::DataStore;
use crate::types::{
    Evidence, Item, NoCandidates, ScoredCandidate, StrategyKind, StrategyOutcome,
    UserPreferenceVector,
};

const CATEGORY_WEIGHT: f64 = 0.4;
const COMMUNITY_WEIGHT: f64 = 0.4;
const COMPLEXITY_WEIGHT: f64 = 0.2;

/// Per-component content match of one item against a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ContentMatch {
    pub category: f64,
    pub community: f64,
    /// `None` when the item carries no complexity score.
    pub complexity: Option<f64>,
}

impl ContentMatch {
    pub fn of(item: &Item, profile: &UserPreferenceVector) -> Self {
        Self {
            category: profile.category_weight(item.category.as_deref()),
            community: profile.community_weight(item.community.as_deref()),
            complexity: item
                .complexity
                .map(|c| 1.0 - (c - profile.complexity_preference).abs()),
        }
    }

    pub fn score(&self) -> f64 {
        CATEGORY_WEIGHT * self.category
            + COMMUNITY_WEIGHT * self.community
            + COMPLEXITY_WEIGHT * self.complexity.unwrap_or(0.0)
    }
}

/// Recommends items that match the user's learned profile.
pub struct ContentBasedStrategy {
    store: Arc<dyn DataStore>,
    threshold: f64,
    pool_size: usize,
}

impl ContentBasedStrategy {
    pub fn new(store: Arc<dyn DataStore>, threshold: f64, pool_size: usize) -> Self {
        Self {
            store,
            threshold,
            pool_size,
        }
    }
}

fn explain(item: &Item, m: &ContentMatch) -> String {
    let category = item.category.as_deref().filter(|_| m.category > 0.0);
    let community = item.community.as_deref().filter(|_| m.community > 0.0);
    match (category, community) {
        (Some(cat), Some(comm)) => format!("Matches your interest in {} and r/{}", cat, comm),
        (Some(cat), None) => format!("Matches your interest in {}", cat),
        (None, Some(comm)) => format!("From r/{}, a community you engage with", comm),
        (None, None) => "Fits your preferred level of detail".to_string(),
    }
}

#[async_trait]
impl RecommendationStrategy for ContentBasedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ContentBased
    }

    async fn recommend(&self, ctx: &StrategyContext) -> StrategyOutcome {
        let profile = ctx.profile.as_ref().ok_or(NoCandidates::NoProfile)?;
        let pool = unseen_pool(self.store.as_ref(), self.kind(), ctx, self.pool_size).await?;

        let mut candidates: Vec<ScoredCandidate> = pool
            .into_iter()
            .filter_map(|item| {
                let m = ContentMatch::of(&item, profile);
                let score = m.score();
                if score <= self.threshold + SCORE_EPSILON {
                    return None;
                }
                let reason = explain(&item, &m);
                Some(
                    ScoredCandidate::new(item, score, StrategyKind::ContentBased, reason)
                        .with_confidence(score)
                        .with_evidence(Evidence {
                            category_match: Some(m.category),
                            community_match: Some(m.community),
                            complexity_match: m.complexity,
                            ..Default::default()
                        }),
                )
            })
            .collect();

        sort_candidates(&mut candidates);
        candidates.truncate(ctx.limit);
        non_empty(candidates, NoCandidates::NoEligibleItems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Utc;
    use std::collections::HashMap;

    fn profile(ai: f64) -> UserPreferenceVector {
        UserPreferenceVector {
            user_id: "u1".into(),
            category_weights: HashMap::from([("ai".to_string(), ai)]),
            community_weights: HashMap::from([("rust".to_string(), 1.0)]),
            complexity_preference: 0.5,
            novelty_preference: 0.0,
            interaction_count: 4,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_score_components() {
        let p = profile(0.5);
        let item = Item::new("i", "t")
            .with_category("ai")
            .with_community("rust")
            .with_complexity(0.7);
        let m = ContentMatch::of(&item, &p);
        assert!((m.score() - (0.2 + 0.4 + 0.2 * 0.8)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_requires_profile() {
        let strategy = ContentBasedStrategy::new(Arc::new(InMemoryStore::new()), 0.3, 100);
        let ctx = StrategyContext::new("u1", 5);
        assert_eq!(strategy.recommend(&ctx).await.unwrap_err(), NoCandidates::NoProfile);
    }

    #[tokio::test]
    async fn test_excludes_seen_and_weak_matches() {
        let store = Arc::new(InMemoryStore::new());
        for item in [
            Item::new("seen", "t").with_category("ai").with_community("rust"),
            Item::new("good", "t").with_category("ai").with_community("rust"),
            Item::new("weak", "t").with_category("cooking"),
        ] {
            store.upsert_item(&item).await.unwrap();
        }
        let strategy = ContentBasedStrategy::new(store, 0.3, 100);
        let ctx = StrategyContext::new("u1", 5)
            .with_profile(Some(profile(1.0)))
            .with_seen(["seen".to_string()].into_iter().collect());

        let out = strategy.recommend(&ctx).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].item_id(), "good");
        assert!(out[0].reason.contains("ai"));
    }
}
