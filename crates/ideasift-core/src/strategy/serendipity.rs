use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{
    non_empty, sort_candidates, store_unavailable, unseen_pool, RecommendationStrategy,
    StrategyContext, SCORE_EPSILON,
};
use crate::features::{action_breakdown, quality_score};
use crate::traits::DataStore;
use crate::types::{
    ActionType, BehaviorEvent, Evidence, Item, NoCandidates, ScoredCandidate, StrategyKind,
    StrategyOutcome,
};

const NEW_CATEGORY_WEIGHT: f64 = 0.6;
const NOVEL_LABEL_WEIGHT: f64 = 0.4;

/// Categories and labels (communities and tags) a user has already touched.
#[derive(Debug, Default)]
pub(crate) struct Explored {
    pub categories: HashSet<String>,
    pub labels: HashSet<String>,
}

impl Explored {
    fn record_item(&mut self, item: &Item) {
        self.categories.extend(item.category.iter().cloned());
        self.labels.extend(item.labels().into_iter().map(str::to_string));
    }

    fn record_event(&mut self, event: &BehaviorEvent) {
        self.categories.extend(event.metadata.category.iter().cloned());
        self.labels.extend(event.metadata.community.iter().cloned());
    }

    /// Returns whether the category is new, the novel label ratio, and the
    /// combined `0.6 * new_category + 0.4 * novel_label_ratio`.
    pub fn novelty(&self, item: &Item) -> (bool, f64, f64) {
        let new_category = item
            .category
            .as_ref()
            .map_or(false, |c| !self.categories.contains(c));
        let labels = item.labels();
        let novel_ratio = if labels.is_empty() {
            0.0
        } else {
            labels.iter().filter(|l| !self.labels.contains(**l)).count() as f64
                / labels.len() as f64
        };
        let component = NEW_CATEGORY_WEIGHT * if new_category { 1.0 } else { 0.0 }
            + NOVEL_LABEL_WEIGHT * novel_ratio;
        (new_category, novel_ratio, component)
    }
}

/// Surfaces well-regarded items from territory the user has not explored.
pub struct SerendipityStrategy {
    store: Arc<dyn DataStore>,
    pool_size: usize,
    serendipity_threshold: f64,
    quality_threshold: f64,
}

impl SerendipityStrategy {
    pub fn new(
        store: Arc<dyn DataStore>,
        pool_size: usize,
        serendipity_threshold: f64,
        quality_threshold: f64,
    ) -> Self {
        Self {
            store,
            pool_size,
            serendipity_threshold,
            quality_threshold,
        }
    }
}

#[async_trait]
impl RecommendationStrategy for SerendipityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Serendipity
    }

    async fn recommend(&self, ctx: &StrategyContext) -> StrategyOutcome {
        let kind = self.kind();
        let history = self
            .store
            .behaviors_by_users(&[ctx.user_id.clone()], &[])
            .await
            .map_err(|e| store_unavailable(kind, &ctx.user_id, e))?;
        if history.is_empty() {
            return Err(NoCandidates::NoBehavior);
        }

        let mut explored = Explored::default();
        for event in &history {
            explored.record_event(event);
        }
        let touched: Vec<String> = history
            .iter()
            .map(|e| e.item_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let touched_items = self
            .store
            .get_items(&touched)
            .await
            .map_err(|e| store_unavailable(kind, &ctx.user_id, e))?;
        for item in &touched_items {
            explored.record_item(item);
        }

        let pool = unseen_pool(self.store.as_ref(), kind, ctx, self.pool_size).await?;
        let novel: Vec<(Item, bool, f64)> = pool
            .into_iter()
            .filter_map(|item| {
                let (new_category, _, component) = explored.novelty(&item);
                (component > self.serendipity_threshold + SCORE_EPSILON)
                    .then_some((item, new_category, component))
            })
            .collect();
        if novel.is_empty() {
            return Err(NoCandidates::NoEligibleItems);
        }

        let ids: Vec<String> = novel.iter().map(|(item, ..)| item.id.clone()).collect();
        let engagement = self
            .store
            .behaviors_on_items(&ids, &ActionType::POSITIVE)
            .await
            .map_err(|e| store_unavailable(kind, &ctx.user_id, e))?;
        let mut by_item: HashMap<&str, Vec<&BehaviorEvent>> = HashMap::new();
        for event in &engagement {
            by_item.entry(event.item_id.as_str()).or_default().push(event);
        }

        let mut candidates: Vec<ScoredCandidate> = novel
            .into_iter()
            .filter_map(|(item, new_category, component)| {
                let breakdown = action_breakdown(
                    by_item
                        .get(item.id.as_str())
                        .into_iter()
                        .flat_map(|events| events.iter().copied()),
                );
                let quality = quality_score(&item, &breakdown);
                if quality <= self.quality_threshold + SCORE_EPSILON {
                    return None;
                }
                let reason = match (new_category, item.category.as_deref()) {
                    (true, Some(cat)) => format!("Something different: a well-liked idea in {}", cat),
                    _ => "Something different from communities you have not explored".to_string(),
                };
                Some(
                    ScoredCandidate::new(item, component * quality, kind, reason)
                        .with_confidence(quality)
                        .with_evidence(Evidence {
                            serendipity: Some(component),
                            quality: Some(quality),
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
