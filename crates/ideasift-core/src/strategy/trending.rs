use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;

use super::{non_empty, sort_candidates, store_unavailable, RecommendationStrategy, StrategyContext};
use crate::features::action_breakdown;
use crate::traits::DataStore;
use crate::types::{
    ActionType, BehaviorEvent, Evidence, NoCandidates, ScoredCandidate, StrategyKind,
    StrategyOutcome,
};

/// Weighted engagement that saturates the trending score.
const TRENDING_SCALE: f64 = 10.0;

/// Ranks items by weighted likes, bookmarks and generations in a recent window.
pub struct TrendingStrategy {
    store: Arc<dyn DataStore>,
    window_days: i64,
}

impl TrendingStrategy {
    pub fn new(store: Arc<dyn DataStore>, window_days: i64) -> Self {
        Self {
            store,
            window_days: window_days.max(1),
        }
    }
}

#[async_trait]
impl RecommendationStrategy for TrendingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Trending
    }

    async fn recommend(&self, ctx: &StrategyContext) -> StrategyOutcome {
        let kind = self.kind();
        let since = ctx.now - Duration::days(self.window_days);
        let events = self
            .store
            .behaviors_since(since, &ActionType::POSITIVE)
            .await
            .map_err(|e| store_unavailable(kind, &ctx.user_id, e))?;

        let mut by_item: HashMap<&str, Vec<&BehaviorEvent>> = HashMap::new();
        for event in events.iter().filter(|e| e.occurred_at <= ctx.now) {
            by_item.entry(event.item_id.as_str()).or_default().push(event);
        }
        if by_item.is_empty() {
            return Err(NoCandidates::NoRecentActivity);
        }

        let item_ids: Vec<String> = by_item
            .keys()
            .filter(|id| !ctx.seen.contains(**id))
            .map(|id| id.to_string())
            .collect();
        let items = self
            .store
            .get_items(&item_ids)
            .await
            .map_err(|e| store_unavailable(kind, &ctx.user_id, e))?;

        let mut candidates: Vec<ScoredCandidate> = items
            .into_iter()
            .filter(|item| item.is_public)
            .filter_map(|item| {
                let breakdown = action_breakdown(by_item.get(item.id.as_str())?.iter().copied());
                let score = (breakdown.weighted_total() / TRENDING_SCALE).min(1.0);
                let reason = format!(
                    "Trending: {} likes, {} bookmarks, {} generations in the last {} days",
                    breakdown.likes, breakdown.bookmarks, breakdown.generations, self.window_days
                );
                Some(
                    ScoredCandidate::new(item, score, kind, reason)
                        .with_confidence(score)
                        .with_evidence(Evidence {
                            action_breakdown: Some(breakdown),
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
