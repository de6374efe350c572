//! User-user overlap and item-item distance.

use ordered_float::OrderedFloat;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::SiftResult;
use crate::traits::DataStore;
use crate::types::{ActionType, BehaviorEvent, Item};

/// A user whose positive engagement overlaps the requester's.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarUser {
    pub user_id: String,
    /// Shared items divided by the requester's item count.
    pub similarity: f64,
    pub shared_items: usize,
}

/// Rank other users by overlap with `source_items`.
///
/// `events` are positive-engagement events on the source items; events by
/// `user_id` itself are ignored.
pub fn rank_similar_users(
    user_id: &str,
    source_items: &HashSet<String>,
    events: &[BehaviorEvent],
    threshold: f64,
    limit: usize,
) -> Vec<SimilarUser> {
    if source_items.is_empty() {
        return Vec::new();
    }

    let mut shared: HashMap<&str, HashSet<&str>> = HashMap::new();
    for event in events {
        if event.user_id == user_id || !source_items.contains(&event.item_id) {
            continue;
        }
        shared
            .entry(event.user_id.as_str())
            .or_default()
            .insert(event.item_id.as_str());
    }

    let denominator = source_items.len() as f64;
    let mut similar: Vec<SimilarUser> = shared
        .into_iter()
        .map(|(other, items)| SimilarUser {
            user_id: other.to_string(),
            similarity: items.len() as f64 / denominator,
            shared_items: items.len(),
        })
        .filter(|s| s.similarity > threshold)
        .collect();

    similar.sort_by(|a, b| {
        OrderedFloat(b.similarity)
            .cmp(&OrderedFloat(a.similarity))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    similar.truncate(limit);
    similar
}

/// Distance between two items in `[0, 1]`.
///
/// 0.4 when categories differ, 0.3 when both communities are known and
/// differ, plus up to 0.3 for creation dates up to 30 days apart.
pub fn diversity_distance(a: &Item, b: &Item) -> f64 {
    let mut distance = 0.0;
    if a.category != b.category {
        distance += 0.4;
    }
    if let (Some(ca), Some(cb)) = (&a.community, &b.community) {
        if ca != cb {
            distance += 0.3;
        }
    }
    let days_apart = (a.created_at - b.created_at).num_seconds().abs() as f64 / 86_400.0;
    distance += 0.3 * (days_apart / 30.0).min(1.0);
    distance
}

/// Finds users with overlapping positive engagement.
#[derive(Clone)]
pub struct SimilarityFinder {
    store: Arc<dyn DataStore>,
    threshold: f64,
    limit: usize,
}

impl SimilarityFinder {
    pub fn new(store: Arc<dyn DataStore>, threshold: f64, limit: usize) -> Self {
        Self {
            store,
            threshold,
            limit,
        }
    }

    /// Items the user engaged with positively.
    pub async fn positive_items(&self, user_id: &str) -> SiftResult<HashSet<String>> {
        let events = self
            .store
            .behaviors_by_users(&[user_id.to_string()], &ActionType::POSITIVE)
            .await?;
        Ok(events.into_iter().map(|e| e.item_id).collect())
    }

    /// Users whose positive items overlap this user's.
    pub async fn similar_users(&self, user_id: &str) -> SiftResult<Vec<SimilarUser>> {
        let source = self.positive_items(user_id).await?;
        if source.is_empty() {
            return Ok(Vec::new());
        }
        let item_ids: Vec<String> = source.iter().cloned().collect();
        let events = self
            .store
            .behaviors_on_items(&item_ids, &ActionType::POSITIVE)
            .await?;
        Ok(rank_similar_users(
            user_id,
            &source,
            &events,
            self.threshold,
            self.limit,
        ))
    }
}
