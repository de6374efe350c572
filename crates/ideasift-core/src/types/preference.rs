use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Learned per-user taste profile.
///
/// Category and community weights are each normalized to sum to 1 when
/// non-empty. The vector is derived data: it can always be rebuilt from the
/// behavior log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferenceVector {
    pub user_id: String,
    pub category_weights: HashMap<String, f64>,
    pub community_weights: HashMap<String, f64>,
    /// Preferred item complexity in `[0, 1]`.
    pub complexity_preference: f64,
    /// Appetite for unfamiliar categories in `[0, 1]`.
    pub novelty_preference: f64,
    /// Number of events the vector was built from.
    pub interaction_count: usize,
    pub last_updated: DateTime<Utc>,
}

impl UserPreferenceVector {
    /// Weight of a category, 0 when unknown or absent.
    pub fn category_weight(&self, category: Option<&str>) -> f64 {
        category
            .and_then(|c| self.category_weights.get(c))
            .copied()
            .unwrap_or(0.0)
    }

    /// Weight of a community, 0 when unknown or absent.
    pub fn community_weight(&self, community: Option<&str>) -> f64 {
        community
            .and_then(|c| self.community_weights.get(c))
            .copied()
            .unwrap_or(0.0)
    }
}
