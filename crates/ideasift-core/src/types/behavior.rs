//! Behavior events: the append-only record of what users did with items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// A user action on an item.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    View,
    Like,
    Bookmark,
    GenerateArtifact,
    Share,
    Copy,
    Click,
}

impl ActionType {
    /// Actions that count as positive engagement for collaborative filtering.
    pub const POSITIVE: [ActionType; 3] = [
        ActionType::Like,
        ActionType::Bookmark,
        ActionType::GenerateArtifact,
    ];

    /// Weight of this action when learning preferences.
    ///
    /// Clicks are weighted like views.
    pub fn preference_weight(&self) -> f64 {
        match self {
            ActionType::View => 1.0,
            ActionType::Like => 3.0,
            ActionType::Bookmark => 4.0,
            ActionType::GenerateArtifact => 5.0,
            ActionType::Share => 4.0,
            ActionType::Copy => 3.0,
            ActionType::Click => 1.0,
        }
    }

    /// Weight of this action in the trending window, if it counts at all.
    pub fn trending_weight(&self) -> Option<f64> {
        match self {
            ActionType::Like => Some(1.0),
            ActionType::Bookmark => Some(2.0),
            ActionType::GenerateArtifact => Some(3.0),
            _ => None,
        }
    }
}

/// Item attributes captured alongside an event.
///
/// Copied from the item at tracking time so preference learning never has to
/// re-read item records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
    /// Item complexity in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
    /// Where the action happened (feed, search, recommendation slot, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl BehaviorMetadata {
    /// Whether no item attribute was recorded.
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.community.is_none() && self.complexity.is_none()
    }
}

/// One immutable behavior record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: BehaviorMetadata,
    pub occurred_at: DateTime<Utc>,
}

impl BehaviorEvent {
    /// Create a new event stamped now with a fresh id.
    pub fn new(
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        action_type: ActionType,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            item_id: item_id.into(),
            action_type,
            duration_seconds: None,
            session_id: None,
            metadata: BehaviorMetadata::default(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: BehaviorMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}
