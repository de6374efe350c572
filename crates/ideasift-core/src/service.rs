//! Caller-facing facade over the engine components.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analytics::{AnalyticsAggregator, AnalyticsDashboardData};
use crate::behavior::{BehaviorLog, TrackRequest};
use crate::config::EngineConfig;
use crate::error::{SiftError, SiftResult};
use crate::experiment::{ExperimentEvent, ExperimentManager};
use crate::features::ItemFeatureSummarizer;
use crate::preference::PreferenceBuilder;
use crate::recommend::{
    ExperimentExposure, RecommendationOutcome, RecommendationRequest, Recommender,
};
use crate::store::open_store;
use crate::strategy::StrategyEngine;
use crate::traits::DataStore;
use crate::types::{
    ActionType, BehaviorEvent, BehaviorMetadata, Experiment, ExperimentAction,
    ExperimentAnalysis, ExperimentStatus, Item, ItemFeatureSummary, NewExperiment,
    PerformanceMetadata, ScoredCandidate, StrategyKind, Variant,
};

/// Recommendations, behavior tracking, experiments and analytics behind one
/// handle.
///
/// Serving calls (`get_recommendations`, `assign_variant`) never fail; they
/// log and degrade. Writes and operator actions return [`SiftResult`].
pub struct RecommendationService {
    config: EngineConfig,
    store: Arc<dyn DataStore>,
    recommender: Recommender,
    behavior: BehaviorLog,
    preferences: PreferenceBuilder,
    features: ItemFeatureSummarizer,
    experiments: ExperimentManager,
    analytics: AnalyticsAggregator,
}

impl RecommendationService {
    /// Build a service over an existing store.
    pub fn new(config: EngineConfig, store: Arc<dyn DataStore>) -> SiftResult<Self> {
        config.validate()?;

        let preferences = PreferenceBuilder::new(store.clone(), config.preferences.history_limit);
        let engine = StrategyEngine::new(store.clone(), &config.strategies);
        let recommender = Recommender::new(
            store.clone(),
            engine,
            preferences.clone(),
            config.strategies.default_strategy,
            config.max_limit,
        );

        Ok(Self {
            recommender,
            behavior: BehaviorLog::new(store.clone()),
            preferences,
            features: ItemFeatureSummarizer::new(store.clone()),
            experiments: ExperimentManager::new(store.clone(), config.experiments.clone()),
            analytics: AnalyticsAggregator::new(store.clone()),
            store,
            config,
        })
    }

    /// Open the configured store and build a service over it.
    pub fn from_config(config: EngineConfig) -> SiftResult<Self> {
        config.validate()?;
        let store = open_store(&config.store)?;
        info!(backend = ?config.store.backend, "opened data store");
        Self::new(config, store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn experiments(&self) -> &ExperimentManager {
        &self.experiments
    }

    /// Ranked recommendations for a user.
    pub async fn get_recommendations(
        &self,
        user_id: &str,
        limit: usize,
        strategy: Option<StrategyKind>,
        diversity_weight: Option<f64>,
    ) -> Vec<ScoredCandidate> {
        let mut request = RecommendationRequest::new(user_id, limit);
        request.strategy = strategy;
        request.diversity_weight = diversity_weight;
        self.recommend(request).await.candidates
    }

    /// Serve a request, routing it through the active experiment if there is
    /// one.
    ///
    /// Under an experiment the variant's strategy replaces the requested one
    /// and every served item is logged as an impression with its 1-based
    /// position.
    pub async fn recommend(&self, mut request: RecommendationRequest) -> RecommendationOutcome {
        let active = match self.experiments.active_experiment().await {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "failed to look up active experiment");
                None
            }
        };

        let Some(experiment) = active else {
            return self.recommender.recommend(&request).await;
        };

        let variant = self
            .experiments
            .assign_variant(&request.user_id, &experiment.id)
            .await;
        request.strategy = Some(experiment.strategy_for(variant));
        let exposure = ExperimentExposure {
            experiment_id: experiment.id.clone(),
            variant,
        };
        debug!(
            user_id = %request.user_id,
            experiment_id = %experiment.id,
            variant = %variant,
            "serving under experiment"
        );

        let outcome = self
            .recommender
            .recommend_with_exposure(&request, Some(&exposure))
            .await;
        self.log_impressions(&request.user_id, &experiment, variant, &outcome)
            .await;
        outcome
    }

    async fn log_impressions(
        &self,
        user_id: &str,
        experiment: &Experiment,
        variant: Variant,
        outcome: &RecommendationOutcome,
    ) {
        let events = outcome.candidates.iter().enumerate().map(|(index, candidate)| {
            ExperimentEvent::new(
                experiment.id.clone(),
                user_id,
                variant,
                ExperimentAction::Impression,
                candidate.item.id.clone(),
            )
            .at_position(index as u32 + 1)
            .with_metadata(PerformanceMetadata {
                engagement_seconds: None,
                strategy: Some(outcome.served_strategy),
            })
        })
        .collect::<Vec<_>>();
        if let Err(e) = self.experiments.log_events_for(experiment, events).await {
            warn!(
                user_id,
                experiment_id = %experiment.id,
                error = %e,
                "failed to log impressions"
            );
        }
    }

    /// Record a user action.
    pub async fn track_behavior(
        &self,
        user_id: &str,
        item_id: &str,
        action_type: ActionType,
        duration_seconds: Option<f64>,
        metadata: Option<BehaviorMetadata>,
    ) -> SiftResult<()> {
        let mut request = TrackRequest::new(user_id, item_id, action_type);
        request.duration_seconds = duration_seconds;
        request.metadata = metadata;
        self.track(request).await.map(|_| ())
    }

    /// Record a user action and return the stored event.
    ///
    /// When configured, the user's preference vector is rebuilt in the
    /// background; the caller does not wait for it.
    pub async fn track(&self, request: TrackRequest) -> SiftResult<BehaviorEvent> {
        let event = self.behavior.track(request).await?;
        if self.config.preferences.refresh_on_track {
            let preferences = self.preferences.clone();
            let user_id = event.user_id.clone();
            tokio::spawn(async move {
                preferences.refresh(&user_id).await;
            });
        }
        Ok(event)
    }

    /// Sticky variant for a user. Failures serve control.
    pub async fn assign_variant(&self, user_id: &str, experiment_id: &str) -> Variant {
        self.experiments.assign_variant(user_id, experiment_id).await
    }

    /// Log an experiment-attributed action.
    pub async fn log_experiment_event(&self, event: ExperimentEvent) -> SiftResult<()> {
        self.experiments.log_event(event).await.map(|_| ())
    }

    /// Test the experiment's metrics and persist the results.
    pub async fn analyze_experiment(&self, experiment_id: &str) -> SiftResult<ExperimentAnalysis> {
        self.experiments.analyze(experiment_id).await
    }

    pub async fn get_dashboard_data(&self) -> SiftResult<AnalyticsDashboardData> {
        self.analytics.dashboard().await
    }

    pub async fn create_experiment(&self, input: NewExperiment) -> SiftResult<Experiment> {
        self.experiments.create_experiment(input).await
    }

    pub async fn get_experiment(&self, experiment_id: &str) -> SiftResult<Experiment> {
        self.experiments.get_experiment(experiment_id).await
    }

    pub async fn transition_experiment(
        &self,
        experiment_id: &str,
        target: ExperimentStatus,
    ) -> SiftResult<Experiment> {
        self.experiments.transition(experiment_id, target).await
    }

    pub async fn update_traffic_split(
        &self,
        experiment_id: &str,
        traffic_split: f64,
    ) -> SiftResult<Experiment> {
        self.experiments
            .update_traffic_split(experiment_id, traffic_split)
            .await
    }

    /// Insert or replace item metadata.
    pub async fn upsert_item(&self, item: &Item) -> SiftResult<()> {
        if item.id.trim().is_empty() {
            return Err(SiftError::missing_field("id"));
        }
        if item.title.trim().is_empty() {
            return Err(SiftError::missing_field("title"));
        }
        self.store.upsert_item(item).await
    }

    pub async fn refresh_item_features(&self, item_id: &str) -> SiftResult<ItemFeatureSummary> {
        self.features.refresh(item_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn service(store: Arc<InMemoryStore>) -> RecommendationService {
        let config = EngineConfig::builder().in_memory().build();
        RecommendationService::new(config, store).unwrap()
    }

    async fn seed(store: &InMemoryStore) {
        for (id, category) in [("a", "tools"), ("b", "tools"), ("c", "art")] {
            store
                .upsert_item(&Item::new(id, id).with_category(category))
                .await
                .unwrap();
        }
        store
            .append_behavior(&BehaviorEvent::new("fan", "a", ActionType::Like))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_track_refreshes_profile_in_background() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store).await;
        let svc = service(store.clone());

        svc.track_behavior("u1", "a", ActionType::Bookmark, Some(12.0), None)
            .await
            .unwrap();

        let mut profile = None;
        for _ in 0..50 {
            profile = store.get_profile("u1").await.unwrap();
            if profile.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let profile = profile.expect("profile should be refreshed");
        assert_eq!(profile.category_weight(Some("tools")), 1.0);
    }

    #[tokio::test]
    async fn test_track_rejects_blank_user() {
        let svc = service(Arc::new(InMemoryStore::new()));
        assert!(svc
            .track_behavior("", "a", ActionType::View, None, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_recommendations_without_experiment() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store).await;
        let svc = service(store);
        let recs = svc
            .get_recommendations("newcomer", 10, Some(StrategyKind::Trending), None)
            .await;
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].item_id(), "a");
    }

    #[tokio::test]
    async fn test_active_experiment_overrides_strategy_and_logs_impressions() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store).await;
        let svc = service(store.clone());

        let exp = svc
            .create_experiment(
                NewExperiment::new("t", StrategyKind::Trending, StrategyKind::Recent)
                    .with_traffic_split(0.5),
            )
            .await
            .unwrap();
        svc.transition_experiment(&exp.id, ExperimentStatus::Active)
            .await
            .unwrap();

        let request = RecommendationRequest::new("u1", 5).with_strategy(StrategyKind::Serendipity);
        let outcome = svc.recommend(request).await;
        let variant = svc.assign_variant("u1", &exp.id).await;
        let stored = store.get_assignment("u1", &exp.id).await.unwrap().unwrap();
        assert_eq!(stored.variant, variant);
        assert_eq!(outcome.requested_strategy, exp.strategy_for(variant));

        let logs = store.performance_logs(&exp.id).await.unwrap();
        assert_eq!(logs.len(), outcome.candidates.len());
        assert!(!logs.is_empty());
        assert!(logs.iter().all(|l| l.action == ExperimentAction::Impression));
        let positions: Vec<_> = logs.iter().filter_map(|l| l.position_in_list).collect();
        assert_eq!(positions, (1..=logs.len() as u32).collect::<Vec<_>>());
        assert!(logs.iter().all(|l| l.variant == variant));

        let metrics = store
            .recommendation_metrics_since(chrono::Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(metrics[0].experiment_id.as_deref(), Some(exp.id.as_str()));
    }

    #[tokio::test]
    async fn test_analyze_and_dashboard() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store);
        let exp = svc
            .create_experiment(NewExperiment::new(
                "t",
                StrategyKind::Hybrid,
                StrategyKind::Diversity,
            ))
            .await
            .unwrap();
        svc.transition_experiment(&exp.id, ExperimentStatus::Active)
            .await
            .unwrap();
        svc.log_experiment_event(ExperimentEvent::new(
            exp.id.clone(),
            "u1",
            Variant::A,
            ExperimentAction::Impression,
            "i1",
        ))
        .await
        .unwrap();

        let analysis = svc.analyze_experiment(&exp.id).await.unwrap();
        assert!(analysis.statistical_tests.is_empty());
        assert_eq!(analysis.winner, None);

        let dashboard = svc.get_dashboard_data().await.unwrap();
        assert_eq!(dashboard.totals.active_experiments, 1);
    }

    #[tokio::test]
    async fn test_upsert_item_and_refresh_features() {
        let svc = service(Arc::new(InMemoryStore::new()));
        assert!(svc.upsert_item(&Item::new("", "t")).await.is_err());
        svc.upsert_item(&Item::new("i1", "Idea").with_content_length(400))
            .await
            .unwrap();
        let summary = svc.refresh_item_features("i1").await.unwrap();
        assert_eq!(summary.item_id, "i1");
        assert!(svc.refresh_item_features("nope").await.unwrap_err().is_not_found());
    }
}
