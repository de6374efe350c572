use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{
    non_empty, sort_candidates, CollaborativeStrategy, ContentBasedStrategy,
    RecommendationStrategy, StrategyContext,
};
use crate::types::{NoCandidates, ScoredCandidate, StrategyKind, StrategyOutcome};

const COLLABORATIVE_WEIGHT: f64 = 0.6;
const CONTENT_WEIGHT: f64 = 0.4;

/// Blends collaborative and content-based scores.
///
/// Both sub-strategies run concurrently over an oversampled pool; an item
/// found by both gets the sum of its weighted scores.
pub struct HybridStrategy {
    collaborative: Arc<CollaborativeStrategy>,
    content: Arc<ContentBasedStrategy>,
    oversample: usize,
}

impl HybridStrategy {
    pub fn new(
        collaborative: Arc<CollaborativeStrategy>,
        content: Arc<ContentBasedStrategy>,
        oversample: usize,
    ) -> Self {
        Self {
            collaborative,
            content,
            oversample: oversample.max(1),
        }
    }
}

struct Blend {
    candidate: ScoredCandidate,
    collaborative: Option<f64>,
    content: Option<f64>,
    confidence: f64,
}

#[async_trait]
impl RecommendationStrategy for HybridStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    async fn recommend(&self, ctx: &StrategyContext) -> StrategyOutcome {
        let sub = ctx.with_limit(ctx.limit.saturating_mul(self.oversample));
        let (collaborative, content) = futures::join!(
            self.collaborative.recommend(&sub),
            self.content.recommend(&sub)
        );

        let (collaborative, content) = match (collaborative, content) {
            (Err(a), Err(b)) => {
                debug!(user_id = %ctx.user_id, collaborative = %a, content = %b, "hybrid has no inputs");
                // Report the more specific reason.
                return Err(if a == NoCandidates::StoreUnavailable || b == NoCandidates::StoreUnavailable {
                    NoCandidates::StoreUnavailable
                } else {
                    a
                });
            }
            (a, b) => (a.unwrap_or_default(), b.unwrap_or_default()),
        };

        let mut order: Vec<String> = Vec::new();
        let mut blends: HashMap<String, Blend> = HashMap::new();

        for c in collaborative {
            let id = c.item.id.clone();
            order.push(id.clone());
            blends.insert(
                id,
                Blend {
                    collaborative: Some(c.score),
                    content: None,
                    confidence: c.confidence,
                    candidate: c,
                },
            );
        }
        for c in content {
            match blends.get_mut(&c.item.id) {
                Some(blend) => {
                    blend.content = Some(c.score);
                    blend.confidence = blend.confidence.max(c.confidence);
                }
                None => {
                    let id = c.item.id.clone();
                    order.push(id.clone());
                    blends.insert(
                        id,
                        Blend {
                            collaborative: None,
                            content: Some(c.score),
                            confidence: c.confidence,
                            candidate: c,
                        },
                    );
                }
            }
        }

        let mut candidates: Vec<ScoredCandidate> = order
            .into_iter()
            .filter_map(|id| blends.remove(&id))
            .map(|blend| {
                let collab = blend.collaborative.unwrap_or(0.0);
                let content = blend.content.unwrap_or(0.0);
                let score = COLLABORATIVE_WEIGHT * collab + CONTENT_WEIGHT * content;
                let reason = match (blend.collaborative, blend.content) {
                    (Some(_), Some(_)) => {
                        "Popular with similar users and matches your interests".to_string()
                    }
                    _ => blend.candidate.reason.clone(),
                };
                let mut evidence = blend.candidate.supporting_evidence.clone().unwrap_or_default();
                evidence.collaborative_score = blend.collaborative;
                evidence.content_score = blend.content;
                ScoredCandidate::new(blend.candidate.item, score, StrategyKind::Hybrid, reason)
                    .with_confidence(blend.confidence)
                    .with_evidence(evidence)
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
    use crate::similarity::SimilarityFinder;
    use crate::store::InMemoryStore;
    use crate::traits::DataStore;
    use crate::types::{ActionType, BehaviorEvent, Item, UserPreferenceVector};
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn hybrid(store: Arc<InMemoryStore>) -> HybridStrategy {
        let finder = SimilarityFinder::new(store.clone(), 0.1, 10);
        HybridStrategy::new(
            Arc::new(CollaborativeStrategy::new(store.clone(), finder)),
            Arc::new(ContentBasedStrategy::new(store, 0.3, 100)),
            2,
        )
    }

    #[tokio::test]
    async fn test_union_is_additive() {
        let store = Arc::new(InMemoryStore::new());
        for item in [
            Item::new("a", "t").with_category("ai"),
            Item::new("both", "t").with_category("ai"),
            Item::new("collab", "t").with_category("cooking"),
            Item::new("content", "t").with_category("ai"),
        ] {
            store.upsert_item(&item).await.unwrap();
        }
        for (user, item) in [("me", "a"), ("peer", "a"), ("peer", "both"), ("peer", "collab")] {
            store
                .append_behavior(&BehaviorEvent::new(user, item, ActionType::Like))
                .await
                .unwrap();
        }
        let profile = UserPreferenceVector {
            user_id: "me".into(),
            category_weights: Map::from([("ai".to_string(), 1.0)]),
            community_weights: Map::new(),
            complexity_preference: 0.5,
            novelty_preference: 0.0,
            interaction_count: 1,
            last_updated: Utc::now(),
        };
        let seen = store.interacted_item_ids("me").await.unwrap();
        let ctx = StrategyContext::new("me", 10)
            .with_profile(Some(profile))
            .with_seen(seen);

        let out = hybrid(store).recommend(&ctx).await.unwrap();
        let score = |id: &str| out.iter().find(|c| c.item_id() == id).map(|c| c.score);

        assert!((score("both").unwrap() - (0.6 + 0.4 * 0.4)).abs() < 1e-12);
        assert!((score("collab").unwrap() - 0.6).abs() < 1e-12);
        assert!((score("content").unwrap() - 0.16).abs() < 1e-12);
        assert_eq!(out[0].item_id(), "both");
        assert!(out.iter().all(|c| c.strategy == StrategyKind::Hybrid));
    }

    #[tokio::test]
    async fn test_no_inputs() {
        let store = Arc::new(InMemoryStore::new());
        let ctx = StrategyContext::new("ghost", 10);
        assert!(hybrid(store).recommend(&ctx).await.is_err());
    }
}
