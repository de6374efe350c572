//! In-process DataStore backed by hash maps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::error::{SiftError, SiftResult};
use crate::traits::{action_matches, DataStore};
use crate::types::{
    ActionType, AssignmentWrite, BehaviorEvent, Experiment, ExperimentAssignment,
    ExperimentStatus, Item, ItemFeatureSummary, PerformanceLogEntry, RecommendationMetric,
    StatisticalTestResult, UserPreferenceVector,
};

#[derive(Default)]
struct Inner {
    items: HashMap<String, Item>,
    behaviors: Vec<BehaviorEvent>,
    profiles: HashMap<String, UserPreferenceVector>,
    item_features: HashMap<String, ItemFeatureSummary>,
    experiments: HashMap<String, Experiment>,
    assignments: HashMap<(String, String), ExperimentAssignment>,
    performance_logs: Vec<PerformanceLogEntry>,
    test_results: Vec<StatisticalTestResult>,
    metrics: Vec<RecommendationMetric>,
}

/// DataStore that keeps everything in memory.
///
/// Suited to tests and embedding. [`InMemoryStore::set_offline`] makes every
/// call fail with a database error, which lets callers exercise their
/// degraded paths.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> SiftResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SiftError::database("store is offline"))
        } else {
            Ok(())
        }
    }
}

fn newest_first(events: &mut [BehaviorEvent]) {
    events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn upsert_item(&self, item: &Item) -> SiftResult<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner.items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> SiftResult<Option<Item>> {
        self.check_online()?;
        Ok(self.inner.read().await.items.get(item_id).cloned())
    }

    async fn get_items(&self, item_ids: &[String]) -> SiftResult<Vec<Item>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let unique: HashSet<&String> = item_ids.iter().collect();
        Ok(unique
            .into_iter()
            .filter_map(|id| inner.items.get(id).cloned())
            .collect())
    }

    async fn recent_public_items(&self, limit: usize) -> SiftResult<Vec<Item>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut items: Vec<Item> = inner.items.values().filter(|i| i.is_public).cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        items.truncate(limit);
        Ok(items)
    }

    async fn append_behavior(&self, event: &BehaviorEvent) -> SiftResult<()> {
        self.check_online()?;
        self.inner.write().await.behaviors.push(event.clone());
        Ok(())
    }

    async fn recent_behaviors(
        &self,
        user_id: &str,
        limit: usize,
    ) -> SiftResult<Vec<BehaviorEvent>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut events: Vec<BehaviorEvent> = inner
            .behaviors
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut events);
        events.truncate(limit);
        Ok(events)
    }

    async fn interacted_item_ids(&self, user_id: &str) -> SiftResult<HashSet<String>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .behaviors
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.item_id.clone())
            .collect())
    }

    async fn item_behaviors(&self, item_id: &str) -> SiftResult<Vec<BehaviorEvent>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .behaviors
            .iter()
            .filter(|e| e.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn behaviors_on_items(
        &self,
        item_ids: &[String],
        actions: &[ActionType],
    ) -> SiftResult<Vec<BehaviorEvent>> {
        self.check_online()?;
        let wanted: HashSet<&str> = item_ids.iter().map(String::as_str).collect();
        let inner = self.inner.read().await;
        Ok(inner
            .behaviors
            .iter()
            .filter(|e| wanted.contains(e.item_id.as_str()) && action_matches(actions, e.action_type))
            .cloned()
            .collect())
    }

    async fn behaviors_by_users(
        &self,
        user_ids: &[String],
        actions: &[ActionType],
    ) -> SiftResult<Vec<BehaviorEvent>> {
        self.check_online()?;
        let wanted: HashSet<&str> = user_ids.iter().map(String::as_str).collect();
        let inner = self.inner.read().await;
        Ok(inner
            .behaviors
            .iter()
            .filter(|e| wanted.contains(e.user_id.as_str()) && action_matches(actions, e.action_type))
            .cloned()
            .collect())
    }

    async fn behaviors_since(
        &self,
        since: DateTime<Utc>,
        actions: &[ActionType],
    ) -> SiftResult<Vec<BehaviorEvent>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .behaviors
            .iter()
            .filter(|e| e.occurred_at >= since && action_matches(actions, e.action_type))
            .cloned()
            .collect())
    }

    async fn get_profile(&self, user_id: &str) -> SiftResult<Option<UserPreferenceVector>> {
        self.check_online()?;
        Ok(self.inner.read().await.profiles.get(user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &UserPreferenceVector) -> SiftResult<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn upsert_item_features(&self, summary: &ItemFeatureSummary) -> SiftResult<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner.item_features.insert(summary.item_id.clone(), summary.clone());
        Ok(())
    }

    async fn get_item_features(&self, item_id: &str) -> SiftResult<Option<ItemFeatureSummary>> {
        self.check_online()?;
        Ok(self.inner.read().await.item_features.get(item_id).cloned())
    }

    async fn insert_experiment(&self, experiment: &Experiment) -> SiftResult<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        if inner.experiments.contains_key(&experiment.id) {
            return Err(SiftError::validation(format!(
                "experiment '{}' already exists",
                experiment.id
            )));
        }
        inner.experiments.insert(experiment.id.clone(), experiment.clone());
        Ok(())
    }

    async fn update_experiment(&self, experiment: &Experiment) -> SiftResult<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        match inner.experiments.get_mut(&experiment.id) {
            Some(existing) => {
                *existing = experiment.clone();
                Ok(())
            }
            None => Err(SiftError::experiment_not_found(&experiment.id)),
        }
    }

    async fn get_experiment(&self, experiment_id: &str) -> SiftResult<Option<Experiment>> {
        self.check_online()?;
        Ok(self.inner.read().await.experiments.get(experiment_id).cloned())
    }

    async fn list_experiments(
        &self,
        status: Option<ExperimentStatus>,
    ) -> SiftResult<Vec<Experiment>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut experiments: Vec<Experiment> = inner
            .experiments
            .values()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        experiments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(experiments)
    }

    async fn get_assignment(
        &self,
        user_id: &str,
        experiment_id: &str,
    ) -> SiftResult<Option<ExperimentAssignment>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .assignments
            .get(&(user_id.to_string(), experiment_id.to_string()))
            .cloned())
    }

    async fn insert_assignment_if_absent(
        &self,
        assignment: &ExperimentAssignment,
    ) -> SiftResult<AssignmentWrite> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let key = (assignment.user_id.clone(), assignment.experiment_id.clone());
        if let Some(existing) = inner.assignments.get(&key) {
            return Ok(AssignmentWrite::Existing(existing.clone()));
        }
        inner.assignments.insert(key, assignment.clone());
        Ok(AssignmentWrite::Inserted(assignment.clone()))
    }

    async fn append_performance_log(&self, entry: &PerformanceLogEntry) -> SiftResult<()> {
        self.check_online()?;
        self.inner.write().await.performance_logs.push(entry.clone());
        Ok(())
    }

    async fn performance_logs(&self, experiment_id: &str) -> SiftResult<Vec<PerformanceLogEntry>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .performance_logs
            .iter()
            .filter(|e| e.experiment_id == experiment_id)
            .cloned()
            .collect())
    }

    async fn save_test_results(&self, results: &[StatisticalTestResult]) -> SiftResult<()> {
        self.check_online()?;
        self.inner.write().await.test_results.extend_from_slice(results);
        Ok(())
    }

    async fn test_results(&self, experiment_id: &str) -> SiftResult<Vec<StatisticalTestResult>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut results: Vec<StatisticalTestResult> = inner
            .test_results
            .iter()
            .filter(|r| r.experiment_id == experiment_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.computed_at.cmp(&a.computed_at));
        Ok(results)
    }

    async fn append_recommendation_metric(
        &self,
        metric: &RecommendationMetric,
    ) -> SiftResult<()> {
        self.check_online()?;
        self.inner.write().await.metrics.push(metric.clone());
        Ok(())
    }

    async fn recommendation_metrics_since(
        &self,
        since: DateTime<Utc>,
    ) -> SiftResult<Vec<RecommendationMetric>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .metrics
            .iter()
            .filter(|m| m.created_at >= since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Variant;
    use chrono::Duration;

    #[tokio::test]
    async fn test_recent_behaviors_newest_first() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        for (i, item) in ["a", "b", "c"].iter().enumerate() {
            let event = BehaviorEvent::new("u1", *item, ActionType::View)
                .at(now - Duration::minutes(10 - i as i64));
            store.append_behavior(&event).await.unwrap();
        }

        let events = store.recent_behaviors("u1", 2).await.unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.item_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_assignment_insert_if_absent_keeps_first() {
        let store = InMemoryStore::new();
        let first = ExperimentAssignment {
            user_id: "u1".into(),
            experiment_id: "e1".into(),
            variant: Variant::A,
            assigned_at: Utc::now(),
        };
        let second = ExperimentAssignment {
            variant: Variant::B,
            ..first.clone()
        };

        assert!(matches!(
            store.insert_assignment_if_absent(&first).await.unwrap(),
            AssignmentWrite::Inserted(_)
        ));
        match store.insert_assignment_if_absent(&second).await.unwrap() {
            AssignmentWrite::Existing(a) => assert_eq!(a.variant, Variant::A),
            other => panic!("expected existing row, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recent_public_items_skips_private() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .upsert_item(&Item::new("old", "Old").created_at(now - Duration::days(2)))
            .await
            .unwrap();
        store
            .upsert_item(&Item::new("new", "New").created_at(now))
            .await
            .unwrap();
        store
            .upsert_item(&Item::new("hidden", "Hidden").private())
            .await
            .unwrap();

        let items = store.recent_public_items(10).await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_offline_store_fails() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        let result = tokio_test::block_on(store.get_item("anything"));
        assert!(matches!(result, Err(SiftError::Database { .. })));
    }
}
