use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{non_empty, sort_candidates, store_unavailable, RecommendationStrategy, StrategyContext};
use crate::similarity::SimilarityFinder;
use crate::traits::DataStore;
use crate::types::{ActionType, Evidence, NoCandidates, ScoredCandidate, StrategyKind, StrategyOutcome};

/// Recommends what users with overlapping taste engaged with.
///
/// Score is the fraction of similar users who engaged positively with the
/// item; confidence is their mean similarity.
pub struct CollaborativeStrategy {
    store: Arc<dyn DataStore>,
    finder: SimilarityFinder,
}

impl CollaborativeStrategy {
    pub fn new(store: Arc<dyn DataStore>, finder: SimilarityFinder) -> Self {
        Self { store, finder }
    }
}

#[async_trait]
impl RecommendationStrategy for CollaborativeStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Collaborative
    }

    async fn recommend(&self, ctx: &StrategyContext) -> StrategyOutcome {
        let kind = self.kind();
        let similar = self
            .finder
            .similar_users(&ctx.user_id)
            .await
            .map_err(|e| store_unavailable(kind, &ctx.user_id, e))?;
        if similar.is_empty() {
            return Err(if ctx.seen.is_empty() {
                NoCandidates::NoBehavior
            } else {
                NoCandidates::NoSimilarUsers
            });
        }

        let similarity: HashMap<&str, f64> = similar
            .iter()
            .map(|s| (s.user_id.as_str(), s.similarity))
            .collect();
        let user_ids: Vec<String> = similar.iter().map(|s| s.user_id.clone()).collect();
        let events = self
            .store
            .behaviors_by_users(&user_ids, &ActionType::POSITIVE)
            .await
            .map_err(|e| store_unavailable(kind, &ctx.user_id, e))?;

        // item -> supporting user -> similarity
        let mut support: HashMap<String, HashMap<&str, f64>> = HashMap::new();
        for event in &events {
            if ctx.seen.contains(&event.item_id) {
                continue;
            }
            if let Some((user, sim)) = similarity.get_key_value(event.user_id.as_str()) {
                support
                    .entry(event.item_id.clone())
                    .or_default()
                    .insert(*user, *sim);
            }
        }
        if support.is_empty() {
            return Err(NoCandidates::NoEligibleItems);
        }

        let item_ids: Vec<String> = support.keys().cloned().collect();
        let items = self
            .store
            .get_items(&item_ids)
            .await
            .map_err(|e| store_unavailable(kind, &ctx.user_id, e))?;

        let n_similar = similar.len() as f64;
        let mut candidates: Vec<ScoredCandidate> = items
            .into_iter()
            .filter(|item| item.is_public)
            .filter_map(|item| {
                let supporters = support.get(&item.id)?;
                let count = supporters.len();
                let score = (count as f64 / n_similar).min(1.0);
                let confidence = supporters.values().sum::<f64>() / count as f64;
                let reason = if count == 1 {
                    "Liked by a user with similar taste".to_string()
                } else {
                    format!("Liked by {} users with similar taste", count)
                };
                Some(
                    ScoredCandidate::new(item, score, kind, reason)
                        .with_confidence(confidence)
                        .with_evidence(Evidence {
                            supporting_users: Some(count),
                            similar_users: Some(similar.len()),
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
    use crate::types::{BehaviorEvent, Item};

    async fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for id in ["a", "b", "c", "d"] {
            store.upsert_item(&Item::new(id, id)).await.unwrap();
        }
        store.upsert_item(&Item::new("secret", "s").private()).await.unwrap();
        for (user, item) in [
            ("me", "a"),
            ("u2", "a"),
            ("u2", "c"),
            ("u2", "secret"),
            ("u3", "a"),
            ("u3", "c"),
            ("u3", "d"),
        ] {
            store
                .append_behavior(&BehaviorEvent::new(user, item, ActionType::Like))
                .await
                .unwrap();
        }
        store
    }

    fn strategy(store: Arc<InMemoryStore>) -> CollaborativeStrategy {
        let finder = SimilarityFinder::new(store.clone(), 0.1, 10);
        CollaborativeStrategy::new(store, finder)
    }

    #[tokio::test]
    async fn test_support_fraction() {
        let store = seeded().await;
        let seen = store.interacted_item_ids("me").await.unwrap();
        let ctx = StrategyContext::new("me", 10).with_seen(seen);

        let out = strategy(store).recommend(&ctx).await.unwrap();
        let ids: Vec<&str> = out.iter().map(|c| c.item_id()).collect();
        assert_eq!(ids, vec!["c", "d"]);
        assert_eq!(out[0].score, 1.0);
        assert_eq!(out[1].score, 0.5);
        assert_eq!(out[0].strategy, StrategyKind::Collaborative);
        assert!(out.iter().all(|c| c.item_id() != "a"));
    }

    #[tokio::test]
    async fn test_no_behavior() {
        let store = seeded().await;
        let ctx = StrategyContext::new("newcomer", 10);
        assert_eq!(
            strategy(store).recommend(&ctx).await.unwrap_err(),
            NoCandidates::NoBehavior
        );
    }

    #[tokio::test]
    async fn test_store_failure() {
        let store = seeded().await;
        store.set_offline(true);
        let ctx = StrategyContext::new("me", 10);
        assert_eq!(
            strategy(store).recommend(&ctx).await.unwrap_err(),
            NoCandidates::StoreUnavailable
        );
    }
}
