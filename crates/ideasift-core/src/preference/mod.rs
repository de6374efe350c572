//! Preference vector builder.
//!
//! Folds a user's recent behavior into normalized category and community
//! weights plus scalar complexity and novelty preferences. The fold is pure
//! ([`build_vector`]); [`PreferenceBuilder`] wraps it with store reads and
//! upserts that never propagate failures.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::traits::DataStore;
use crate::types::{BehaviorEvent, UserPreferenceVector};

const DEFAULT_COMPLEXITY: f64 = 0.5;

/// Build a preference vector from events. Returns `None` for no events.
pub fn build_vector(
    user_id: &str,
    events: &[BehaviorEvent],
    now: DateTime<Utc>,
) -> Option<UserPreferenceVector> {
    if events.is_empty() {
        return None;
    }

    let mut category_weights: HashMap<String, f64> = HashMap::new();
    let mut community_weights: HashMap<String, f64> = HashMap::new();
    let mut complexity_sum = 0.0;
    let mut complexity_weight = 0.0;
    let mut categorized = 0usize;
    let mut distinct_categories: HashSet<&str> = HashSet::new();

    for event in events {
        let weight = event.action_type.preference_weight();
        if let Some(category) = &event.metadata.category {
            *category_weights.entry(category.clone()).or_insert(0.0) += weight;
            categorized += 1;
            distinct_categories.insert(category.as_str());
        }
        if let Some(community) = &event.metadata.community {
            *community_weights.entry(community.clone()).or_insert(0.0) += weight;
        }
        if let Some(complexity) = event.metadata.complexity {
            complexity_sum += weight * complexity;
            complexity_weight += weight;
        }
    }

    normalize(&mut category_weights);
    normalize(&mut community_weights);

    let complexity_preference = if complexity_weight > 0.0 {
        (complexity_sum / complexity_weight).clamp(0.0, 1.0)
    } else {
        DEFAULT_COMPLEXITY
    };
    let novelty_preference = if categorized > 0 {
        (distinct_categories.len() as f64 / categorized as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(UserPreferenceVector {
        user_id: user_id.to_string(),
        category_weights,
        community_weights,
        complexity_preference,
        novelty_preference,
        interaction_count: events.len(),
        last_updated: now,
    })
}

/// Scale weights so they sum to 1. Leaves an all-zero map untouched.
fn normalize(weights: &mut HashMap<String, f64>) {
    let total: f64 = weights.values().sum();
    if total > 0.0 {
        for w in weights.values_mut() {
            *w /= total;
        }
    }
}

/// Reads behavior and maintains stored preference vectors.
#[derive(Clone)]
pub struct PreferenceBuilder {
    store: Arc<dyn DataStore>,
    history_limit: usize,
}

impl PreferenceBuilder {
    pub fn new(store: Arc<dyn DataStore>, history_limit: usize) -> Self {
        Self {
            store,
            history_limit: history_limit.max(1),
        }
    }

    /// Compute a vector from the user's recent events without storing it.
    pub async fn build(&self, user_id: &str) -> Option<UserPreferenceVector> {
        let events = match self.store.recent_behaviors(user_id, self.history_limit).await {
            Ok(events) => events,
            Err(e) => {
                warn!(user_id, error = %e, "failed to read behavior; treating as no profile");
                return None;
            }
        };
        build_vector(user_id, &events, Utc::now())
    }

    /// Compute and upsert the user's vector.
    ///
    /// A failed upsert is logged; the freshly computed vector is still
    /// returned so the current request can use it.
    pub async fn refresh(&self, user_id: &str) -> Option<UserPreferenceVector> {
        let vector = self.build(user_id).await?;
        if let Err(e) = self.store.upsert_profile(&vector).await {
            warn!(user_id, error = %e, "failed to store preference vector");
        } else {
            debug!(
                user_id,
                interactions = vector.interaction_count,
                categories = vector.category_weights.len(),
                "preference vector refreshed"
            );
        }
        Some(vector)
    }

    /// The stored vector, or one built on demand when none is stored.
    pub async fn load_or_build(&self, user_id: &str) -> Option<UserPreferenceVector> {
        match self.store.get_profile(user_id).await {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => self.refresh(user_id).await,
            Err(e) => {
                warn!(user_id, error = %e, "failed to load preference vector");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{ActionType, BehaviorMetadata};

    fn event(action: ActionType, category: &str, community: Option<&str>) -> BehaviorEvent {
        BehaviorEvent::new("u1", "item", action).with_metadata(BehaviorMetadata {
            category: Some(category.to_string()),
            community: community.map(str::to_string),
            ..Default::default()
        })
    }

    #[test]
    fn test_empty_history_is_none() {
        assert!(build_vector("u1", &[], Utc::now()).is_none());
    }

    #[test]
    fn test_weights_normalized() {
        let events = vec![
            event(ActionType::Like, "ai", Some("MachineLearning")),
            event(ActionType::Like, "ai", None),
            event(ActionType::Like, "ai", None),
            event(ActionType::Like, "devops", Some("kubernetes")),
        ];
        let v = build_vector("u1", &events, Utc::now()).unwrap();

        assert!((v.category_weights["ai"] - 0.75).abs() < 1e-12);
        assert!((v.category_weights["devops"] - 0.25).abs() < 1e-12);
        let total: f64 = v.community_weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(v.interaction_count, 4);
    }

    #[test]
    fn test_action_weights_applied() {
        let events = vec![
            event(ActionType::View, "a", None),
            event(ActionType::GenerateArtifact, "b", None),
        ];
        let v = build_vector("u1", &events, Utc::now()).unwrap();
        assert!((v.category_weights["a"] - 1.0 / 6.0).abs() < 1e-12);
        assert!((v.category_weights["b"] - 5.0 / 6.0).abs() < 1e-12);
        assert!((v.novelty_preference - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_complexity_preference_weighted() {
        let mut low = event(ActionType::View, "a", None);
        low.metadata.complexity = Some(0.2);
        let mut high = event(ActionType::Like, "a", None);
        high.metadata.complexity = Some(0.6);
        let v = build_vector("u1", &[low, high], Utc::now()).unwrap();
        // (1*0.2 + 3*0.6) / 4
        assert!((v.complexity_preference - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_uncategorized_events_default_scalars() {
        let events = vec![BehaviorEvent::new("u1", "x", ActionType::View)];
        let v = build_vector("u1", &events, Utc::now()).unwrap();
        assert!(v.category_weights.is_empty());
        assert_eq!(v.complexity_preference, DEFAULT_COMPLEXITY);
        assert_eq!(v.novelty_preference, 0.0);
    }

    #[tokio::test]
    async fn test_refresh_upserts_and_respects_history_limit() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        for i in 0..5 {
            let e = event(ActionType::Like, if i < 2 { "old" } else { "new" }, None)
                .at(now - chrono::Duration::minutes(10 - i));
            store.append_behavior(&e).await.unwrap();
        }
        let builder = PreferenceBuilder::new(store.clone(), 3);

        let v = builder.refresh("u1").await.unwrap();
        assert_eq!(v.interaction_count, 3);
        assert_eq!(v.category_weights.get("new"), Some(&1.0));
        assert!(store.get_profile("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_failure_is_no_profile() {
        let store = Arc::new(InMemoryStore::new());
        store.set_offline(true);
        let builder = PreferenceBuilder::new(store, 100);
        assert!(builder.load_or_build("u1").await.is_none());
    }
}
