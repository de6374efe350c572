//! DataStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::SiftResult;
use crate::types::{
    ActionType, AssignmentWrite, BehaviorEvent, Experiment, ExperimentAssignment,
    ExperimentStatus, Item, ItemFeatureSummary, PerformanceLogEntry, RecommendationMetric,
    StatisticalTestResult, UserPreferenceVector,
};

/// Persistence collaborator for items, behavior, profiles and experiments.
///
/// Every write is either an append, an upsert by natural key, or (for
/// assignments) an insert-if-absent that never overwrites. Action filters take
/// a slice of action types; an empty slice matches every action.
#[async_trait]
pub trait DataStore: Send + Sync {
    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// Insert or replace an item by id.
    async fn upsert_item(&self, item: &Item) -> SiftResult<()>;

    /// Get an item by id.
    async fn get_item(&self, item_id: &str) -> SiftResult<Option<Item>>;

    /// Get the items that exist among `item_ids`, in no particular order.
    async fn get_items(&self, item_ids: &[String]) -> SiftResult<Vec<Item>>;

    /// Newest public items first.
    async fn recent_public_items(&self, limit: usize) -> SiftResult<Vec<Item>>;

    // ------------------------------------------------------------------
    // Behavior log
    // ------------------------------------------------------------------

    /// Append a behavior event. Events are never updated.
    async fn append_behavior(&self, event: &BehaviorEvent) -> SiftResult<()>;

    /// A user's most recent events, newest first.
    async fn recent_behaviors(&self, user_id: &str, limit: usize)
        -> SiftResult<Vec<BehaviorEvent>>;

    /// Every item the user has touched with any action, across all time.
    async fn interacted_item_ids(&self, user_id: &str) -> SiftResult<HashSet<String>>;

    /// All events on one item.
    async fn item_behaviors(&self, item_id: &str) -> SiftResult<Vec<BehaviorEvent>>;

    /// Events on any of `item_ids` with a matching action.
    async fn behaviors_on_items(
        &self,
        item_ids: &[String],
        actions: &[ActionType],
    ) -> SiftResult<Vec<BehaviorEvent>>;

    /// Events by any of `user_ids` with a matching action.
    async fn behaviors_by_users(
        &self,
        user_ids: &[String],
        actions: &[ActionType],
    ) -> SiftResult<Vec<BehaviorEvent>>;

    /// Events at or after `since` with a matching action.
    async fn behaviors_since(
        &self,
        since: DateTime<Utc>,
        actions: &[ActionType],
    ) -> SiftResult<Vec<BehaviorEvent>>;

    // ------------------------------------------------------------------
    // Derived profiles
    // ------------------------------------------------------------------

    /// Get a user's preference vector.
    async fn get_profile(&self, user_id: &str) -> SiftResult<Option<UserPreferenceVector>>;

    /// Insert or replace a preference vector by user id.
    async fn upsert_profile(&self, profile: &UserPreferenceVector) -> SiftResult<()>;

    /// Insert or replace an item feature summary by item id.
    async fn upsert_item_features(&self, summary: &ItemFeatureSummary) -> SiftResult<()>;

    /// Get an item feature summary.
    async fn get_item_features(&self, item_id: &str) -> SiftResult<Option<ItemFeatureSummary>>;

    // ------------------------------------------------------------------
    // Experiments
    // ------------------------------------------------------------------

    /// Insert a new experiment.
    async fn insert_experiment(&self, experiment: &Experiment) -> SiftResult<()>;

    /// Replace an existing experiment. Fails with not-found when absent.
    async fn update_experiment(&self, experiment: &Experiment) -> SiftResult<()>;

    /// Get an experiment by id.
    async fn get_experiment(&self, experiment_id: &str) -> SiftResult<Option<Experiment>>;

    /// List experiments, optionally filtered by status, newest first.
    async fn list_experiments(
        &self,
        status: Option<ExperimentStatus>,
    ) -> SiftResult<Vec<Experiment>>;

    /// Get the stored assignment for a user in an experiment.
    async fn get_assignment(
        &self,
        user_id: &str,
        experiment_id: &str,
    ) -> SiftResult<Option<ExperimentAssignment>>;

    /// Store `assignment` unless one already exists for the same
    /// `(user_id, experiment_id)`; either way return the persisted row.
    async fn insert_assignment_if_absent(
        &self,
        assignment: &ExperimentAssignment,
    ) -> SiftResult<AssignmentWrite>;

    /// Append an experiment performance log entry.
    async fn append_performance_log(&self, entry: &PerformanceLogEntry) -> SiftResult<()>;

    /// All performance log entries for an experiment, oldest first.
    async fn performance_logs(&self, experiment_id: &str) -> SiftResult<Vec<PerformanceLogEntry>>;

    /// Persist computed test results.
    async fn save_test_results(&self, results: &[StatisticalTestResult]) -> SiftResult<()>;

    /// Stored test results for an experiment, newest first.
    async fn test_results(&self, experiment_id: &str) -> SiftResult<Vec<StatisticalTestResult>>;

    // ------------------------------------------------------------------
    // Recommendation metrics
    // ------------------------------------------------------------------

    /// Append a served-recommendation record.
    async fn append_recommendation_metric(&self, metric: &RecommendationMetric)
        -> SiftResult<()>;

    /// Served-recommendation records at or after `since`.
    async fn recommendation_metrics_since(
        &self,
        since: DateTime<Utc>,
    ) -> SiftResult<Vec<RecommendationMetric>>;
}

/// Whether `action` passes an action filter (empty matches all).
pub(crate) fn action_matches(actions: &[ActionType], action: ActionType) -> bool {
    actions.is_empty() || actions.contains(&action)
}
