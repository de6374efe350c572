use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{StrategyKind, Variant};

/// Record of one served recommendation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationMetric {
    pub id: String,
    pub user_id: String,
    pub requested_strategy: StrategyKind,
    /// Strategy that actually produced the list after fallbacks.
    pub served_strategy: StrategyKind,
    pub recommended_item_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    pub created_at: DateTime<Utc>,
}
