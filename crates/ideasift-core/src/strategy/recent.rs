use async_trait::async_trait;
use std::sync::Arc;

use super::{unseen_pool, RecommendationStrategy, StrategyContext};
use crate::traits::DataStore;
use crate::types::{ScoredCandidate, StrategyKind, StrategyOutcome};

/// Newest public items. Used as the last fallback so nobody gets an empty feed.
pub struct RecentStrategy {
    store: Arc<dyn DataStore>,
}

impl RecentStrategy {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecommendationStrategy for RecentStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Recent
    }

    async fn recommend(&self, ctx: &StrategyContext) -> StrategyOutcome {
        // Over-fetch so unseen items can still fill the page.
        let fetch = ctx.limit.saturating_add(ctx.seen.len());
        let pool = unseen_pool(self.store.as_ref(), self.kind(), ctx, fetch).await?;

        Ok(pool
            .into_iter()
            .take(ctx.limit)
            .enumerate()
            .map(|(rank, item)| {
                let score = 0.5 / (rank as f64 + 1.0);
                ScoredCandidate::new(item, score, StrategyKind::Recent, "Recently shared")
                    .with_confidence(0.1)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{Item, NoCandidates};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_newest_first_with_decaying_scores() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        for (i, id) in ["old", "mid", "new"].iter().enumerate() {
            store
                .upsert_item(&Item::new(*id, *id).created_at(now - Duration::hours(3 - i as i64)))
                .await
                .unwrap();
        }
        let strategy = RecentStrategy::new(store);
        let ctx = StrategyContext::new("u1", 2).with_seen(["new".to_string()].into_iter().collect());

        let out = strategy.recommend(&ctx).await.unwrap();
        let ids: Vec<&str> = out.iter().map(|c| c.item_id()).collect();
        assert_eq!(ids, vec!["mid", "old"]);
        assert_eq!(out[0].score, 0.5);
        assert_eq!(out[1].score, 0.25);
    }

    #[tokio::test]
    async fn test_empty_catalog() {
        let strategy = RecentStrategy::new(Arc::new(InMemoryStore::new()));
        let ctx = StrategyContext::new("u1", 5);
        assert_eq!(
            strategy.recommend(&ctx).await.unwrap_err(),
            NoCandidates::NoEligibleItems
        );
    }
}
