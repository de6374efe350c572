//! Maximal Marginal Relevance re-ranking.

use async_trait::async_trait;
use std::sync::Arc;

use super::{non_empty, HybridStrategy, RecommendationStrategy, StrategyContext};
use crate::similarity::diversity_distance;
use crate::types::{NoCandidates, ScoredCandidate, StrategyKind, StrategyOutcome};

/// Greedy MMR selection.
///
/// Each step picks the remaining candidate maximizing
/// `lambda * relevance + (1 - lambda) * mean distance to the picks so far`.
/// The first pick's distance term is 1. Ties keep the earlier candidate, so
/// with `lambda = 1` the output is the input order. Picks are returned in
/// selection order with their marginal value as the score.
pub fn mmr_select(pool: Vec<ScoredCandidate>, limit: usize, lambda: f64) -> Vec<ScoredCandidate> {
    let lambda = if lambda.is_finite() { lambda.clamp(0.0, 1.0) } else { 1.0 };
    let mut remaining = pool;
    let mut selected: Vec<ScoredCandidate> = Vec::with_capacity(limit.min(remaining.len()));

    while selected.len() < limit && !remaining.is_empty() {
        let mut best: Option<(usize, f64, f64)> = None;
        for (idx, candidate) in remaining.iter().enumerate() {
            let diversity = if selected.is_empty() {
                1.0
            } else {
                selected
                    .iter()
                    .map(|s| diversity_distance(&candidate.item, &s.item))
                    .sum::<f64>()
                    / selected.len() as f64
            };
            let value = lambda * candidate.score + (1.0 - lambda) * diversity;
            if best.map_or(true, |(_, best_value, _)| value > best_value) {
                best = Some((idx, value, diversity));
            }
        }

        let Some((idx, value, diversity)) = best else {
            break;
        };
        let picked = remaining.remove(idx);
        let relevance = picked.score;
        let mut evidence = picked.supporting_evidence.clone().unwrap_or_default();
        evidence.relevance = Some(relevance);
        evidence.diversity = Some(diversity);
        let confidence = picked.confidence;
        let reason = picked.reason.clone();
        selected.push(
            ScoredCandidate::new(picked.item, value, StrategyKind::Diversity, reason)
                .with_confidence(confidence)
                .with_evidence(evidence),
        );
    }

    selected
}

/// Re-ranks an oversampled hybrid pool for variety.
pub struct DiversityStrategy {
    hybrid: Arc<HybridStrategy>,
    oversample: usize,
}

impl DiversityStrategy {
    pub fn new(hybrid: Arc<HybridStrategy>, oversample: usize) -> Self {
        Self {
            hybrid,
            oversample: oversample.max(1),
        }
    }
}

#[async_trait]
impl RecommendationStrategy for DiversityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Diversity
    }

    async fn recommend(&self, ctx: &StrategyContext) -> StrategyOutcome {
        let pool = self
            .hybrid
            .recommend(&ctx.with_limit(ctx.limit.saturating_mul(self.oversample)))
            .await?;
        let selected = mmr_select(pool, ctx.limit, ctx.diversity_weight);
        non_empty(selected, NoCandidates::NoEligibleItems)
    }
}
