//! Recommendation orchestrator.
//!
//! Runs the requested strategy and falls back to trending, then to recent
//! public items, until one of them yields something the user has not seen.
//! Every list is deduplicated, filtered against the user's full interaction
//! history and truncated before it is returned. Serving never fails: the
//! worst case is an empty list.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::preference::PreferenceBuilder;
use crate::strategy::{StrategyContext, StrategyEngine, DEFAULT_DIVERSITY_WEIGHT};
use crate::traits::DataStore;
use crate::types::{RecommendationMetric, ScoredCandidate, StrategyKind, Variant};

/// A recommendation request.
#[derive(Debug, Clone)]
pub struct RecommendationRequest {
    pub user_id: String,
    pub limit: usize,
    pub strategy: Option<StrategyKind>,
    pub diversity_weight: Option<f64>,
}

impl RecommendationRequest {
    pub fn new(user_id: impl Into<String>, limit: usize) -> Self {
        Self {
            user_id: user_id.into(),
            limit,
            strategy: None,
            diversity_weight: None,
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_diversity_weight(mut self, weight: f64) -> Self {
        self.diversity_weight = Some(weight);
        self
    }
}

/// Experiment arm a request is being served under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentExposure {
    pub experiment_id: String,
    pub variant: Variant,
}

/// What was served and how.
#[derive(Debug, Clone)]
pub struct RecommendationOutcome {
    pub candidates: Vec<ScoredCandidate>,
    pub requested_strategy: StrategyKind,
    /// Strategy that produced the list after fallbacks.
    pub served_strategy: StrategyKind,
}

/// Deduplicate by item id keeping the best score, drop seen items, truncate.
///
/// Order is preserved by first occurrence.
pub fn post_process(
    candidates: Vec<ScoredCandidate>,
    seen: &HashSet<String>,
    limit: usize,
) -> Vec<ScoredCandidate> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ScoredCandidate> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        if seen.contains(&candidate.item.id) {
            continue;
        }
        match position.get(&candidate.item.id) {
            Some(&idx) => {
                if candidate.score > unique[idx].score {
                    unique[idx] = candidate;
                }
            }
            None => {
                position.insert(candidate.item.id.clone(), unique.len());
                unique.push(candidate);
            }
        }
    }

    unique.truncate(limit);
    unique
}

/// Fallback order for a requested strategy, without repeats.
fn fallback_chain(requested: StrategyKind) -> Vec<StrategyKind> {
    let mut chain = vec![requested];
    for kind in [StrategyKind::Trending, StrategyKind::Recent] {
        if !chain.contains(&kind) {
            chain.push(kind);
        }
    }
    chain
}

/// Serves recommendations.
pub struct Recommender {
    store: Arc<dyn DataStore>,
    engine: StrategyEngine,
    preferences: PreferenceBuilder,
    default_strategy: StrategyKind,
    max_limit: usize,
}

impl Recommender {
    pub fn new(
        store: Arc<dyn DataStore>,
        engine: StrategyEngine,
        preferences: PreferenceBuilder,
        default_strategy: StrategyKind,
        max_limit: usize,
    ) -> Self {
        Self {
            store,
            engine,
            preferences,
            default_strategy,
            max_limit: max_limit.max(1),
        }
    }

    /// Recommend without experiment attribution.
    pub async fn recommend(&self, request: &RecommendationRequest) -> RecommendationOutcome {
        self.recommend_with_exposure(request, None).await
    }

    /// Recommend, recording the experiment arm in the served metric.
    pub async fn recommend_with_exposure(
        &self,
        request: &RecommendationRequest,
        exposure: Option<&ExperimentExposure>,
    ) -> RecommendationOutcome {
        let requested = request.strategy.unwrap_or(self.default_strategy);
        let limit = request.limit.clamp(1, self.max_limit);
        let diversity_weight = request
            .diversity_weight
            .unwrap_or(DEFAULT_DIVERSITY_WEIGHT)
            .clamp(0.0, 1.0);

        let profile = self.preferences.load_or_build(&request.user_id).await;
        let seen = match self.store.interacted_item_ids(&request.user_id).await {
            Ok(seen) => seen,
            Err(e) => {
                // Without the history we cannot guarantee exclusion; serve nothing.
                warn!(user_id = %request.user_id, error = %e, "failed to load interaction history");
                return RecommendationOutcome {
                    candidates: Vec::new(),
                    requested_strategy: requested,
                    served_strategy: requested,
                };
            }
        };

        let ctx = StrategyContext::new(request.user_id.clone(), limit)
            .with_profile(profile)
            .with_seen(seen)
            .with_diversity_weight(diversity_weight);

        let mut served = requested;
        let mut candidates = Vec::new();
        for kind in fallback_chain(requested) {
            let produced = match self.engine.run(kind, &ctx).await {
                Ok(list) => post_process(list, &ctx.seen, limit),
                Err(_) => Vec::new(),
            };
            if !produced.is_empty() {
                served = kind;
                candidates = produced;
                break;
            }
            debug!(user_id = %request.user_id, strategy = %kind, "falling back");
        }

        if served != requested {
            info!(
                user_id = %request.user_id,
                requested = %requested,
                served = %served,
                "served fallback recommendations"
            );
        }

        self.record_metric(&request.user_id, requested, served, &candidates, exposure)
            .await;

        RecommendationOutcome {
            candidates,
            requested_strategy: requested,
            served_strategy: served,
        }
    }

    async fn record_metric(
        &self,
        user_id: &str,
        requested: StrategyKind,
        served: StrategyKind,
        candidates: &[ScoredCandidate],
        exposure: Option<&ExperimentExposure>,
    ) {
        let metric = RecommendationMetric {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            requested_strategy: requested,
            served_strategy: served,
            recommended_item_ids: candidates.iter().map(|c| c.item.id.clone()).collect(),
            experiment_id: exposure.map(|e| e.experiment_id.clone()),
            variant: exposure.map(|e| e.variant),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append_recommendation_metric(&metric).await {
            warn!(user_id, error = %e, "failed to record recommendation metric");
        }
    }
}
