//! Item feature summaries and the quality heuristic.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::error::{SiftError, SiftResult};
use crate::traits::DataStore;
use crate::types::{ActionBreakdown, ActionType, BehaviorEvent, Item, ItemFeatureSummary};

/// Content length treated as maximally complex when no editorial score exists.
const COMPLEXITY_LENGTH_SCALE: f64 = 2000.0;
/// Weighted engagement that saturates popularity.
const POPULARITY_SCALE: f64 = 50.0;
/// Age after which an item has no novelty left.
const NOVELTY_HORIZON_DAYS: f64 = 30.0;

/// Count likes, bookmarks and generations in `events`.
pub fn action_breakdown<'a>(events: impl IntoIterator<Item = &'a BehaviorEvent>) -> ActionBreakdown {
    let mut breakdown = ActionBreakdown::default();
    for event in events {
        match event.action_type {
            ActionType::Like => breakdown.likes += 1,
            ActionType::Bookmark => breakdown.bookmarks += 1,
            ActionType::GenerateArtifact => breakdown.generations += 1,
            _ => {}
        }
    }
    breakdown
}

/// Complexity of an item: the editorial score, else derived from length.
pub fn complexity_score(item: &Item) -> f64 {
    item.complexity
        .unwrap_or_else(|| (item.content_length as f64 / COMPLEXITY_LENGTH_SCALE).min(1.0))
        .clamp(0.0, 1.0)
}

/// Derive a feature summary from an item and all events on it.
pub fn summarize(item: &Item, events: &[BehaviorEvent], now: DateTime<Utc>) -> ItemFeatureSummary {
    let engagement: f64 = events
        .iter()
        .map(|e| e.action_type.preference_weight())
        .sum();
    let age_days = (now - item.created_at).num_seconds().max(0) as f64 / 86_400.0;

    ItemFeatureSummary {
        item_id: item.id.clone(),
        category: item.category.clone(),
        community: item.community.clone(),
        complexity_score: complexity_score(item),
        popularity_score: (engagement / POPULARITY_SCALE).min(1.0),
        novelty_score: (1.0 - age_days / NOVELTY_HORIZON_DAYS).max(0.0),
        last_updated: now,
    }
}

/// Quality heuristic in `[0.3, 1]` from engagement and content length.
///
/// An item nobody engaged with and with no body scores the 0.3 floor.
pub fn quality_score(item: &Item, breakdown: &ActionBreakdown) -> f64 {
    let engagement = breakdown.weighted_total() / 20.0;
    let length = item.content_length as f64 / 1000.0;
    (0.3 + 0.4 * engagement.min(1.0) + 0.3 * length.min(1.0)).min(1.0)
}

/// Computes and stores item feature summaries.
pub struct ItemFeatureSummarizer {
    store: Arc<dyn DataStore>,
}

impl ItemFeatureSummarizer {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Recompute and upsert the summary for one item.
    pub async fn refresh(&self, item_id: &str) -> SiftResult<ItemFeatureSummary> {
        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or_else(|| SiftError::item_not_found(item_id))?;
        let events = self.store.item_behaviors(item_id).await?;
        let summary = summarize(&item, &events, Utc::now());
        self.store.upsert_item_features(&summary).await?;
        debug!(
            item_id,
            popularity = summary.popularity_score,
            novelty = summary.novelty_score,
            "item features refreshed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Duration;

    #[test]
    fn test_complexity_falls_back_to_length() {
        let item = Item::new("i", "t").with_content_length(500);
        assert!((complexity_score(&item) - 0.25).abs() < 1e-12);
        let long = Item::new("i", "t").with_content_length(10_000);
        assert_eq!(complexity_score(&long), 1.0);
        let scored = Item::new("i", "t").with_content_length(10_000).with_complexity(0.4);
        assert_eq!(complexity_score(&scored), 0.4);
    }

    #[test]
    fn test_summary_scores() {
        let now = Utc::now();
        let item = Item::new("i1", "t").created_at(now - Duration::days(15));
        let events: Vec<BehaviorEvent> = (0..10)
            .map(|_| BehaviorEvent::new("u", "i1", ActionType::GenerateArtifact))
            .collect();
        let summary = summarize(&item, &events, now);
        assert_eq!(summary.popularity_score, 1.0);
        assert!((summary.novelty_score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_quality_floor_and_cap() {
        let bare = Item::new("i", "t");
        assert!((quality_score(&bare, &ActionBreakdown::default()) - 0.3).abs() < 1e-12);

        let rich = Item::new("i", "t").with_content_length(5000);
        let busy = ActionBreakdown {
            likes: 20,
            bookmarks: 0,
            generations: 0,
        };
        assert_eq!(quality_score(&rich, &busy), 1.0);
    }

    #[tokio::test]
    async fn test_refresh_missing_item() {
        let summarizer = ItemFeatureSummarizer::new(Arc::new(InMemoryStore::new()));
        let err = summarizer.refresh("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_refresh_persists() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_item(&Item::new("i1", "t").with_category("ai"))
            .await
            .unwrap();
        store
            .append_behavior(&BehaviorEvent::new("u1", "i1", ActionType::Like))
            .await
            .unwrap();
        let summarizer = ItemFeatureSummarizer::new(store.clone());

        let summary = summarizer.refresh("i1").await.unwrap();
        assert!((summary.popularity_score - 3.0 / 50.0).abs() < 1e-12);
        let stored = store.get_item_features("i1").await.unwrap().unwrap();
        assert_eq!(stored.category.as_deref(), Some("ai"));
    }
}
