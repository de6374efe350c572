//! Behavior log: validated, enriched appends of user actions.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{SiftError, SiftResult};
use crate::traits::DataStore;
use crate::types::{ActionType, BehaviorEvent, BehaviorMetadata};

/// A tracking request as it arrives from a caller.
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub user_id: String,
    pub item_id: String,
    pub action_type: ActionType,
    pub duration_seconds: Option<f64>,
    pub session_id: Option<String>,
    pub metadata: Option<BehaviorMetadata>,
}

impl TrackRequest {
    pub fn new(
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        action_type: ActionType,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            action_type,
            duration_seconds: None,
            session_id: None,
            metadata: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: BehaviorMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Append-only writer for behavior events.
pub struct BehaviorLog {
    store: Arc<dyn DataStore>,
}

impl BehaviorLog {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Validate, enrich and append one event.
    ///
    /// Missing item attributes are copied from the item record so that
    /// preference learning only ever reads the log. A missing item is not an
    /// error: the event is still recorded with whatever metadata was given.
    pub async fn track(&self, request: TrackRequest) -> SiftResult<BehaviorEvent> {
        if request.user_id.trim().is_empty() {
            return Err(SiftError::missing_field("user_id"));
        }
        if request.item_id.trim().is_empty() {
            return Err(SiftError::missing_field("item_id"));
        }
        if let Some(d) = request.duration_seconds {
            if !d.is_finite() || d < 0.0 {
                return Err(SiftError::validation_with_suggestion(
                    format!("duration_seconds must be a non-negative number, got {}", d),
                    "Omit the duration when it is unknown",
                ));
            }
        }

        let mut metadata = request.metadata.unwrap_or_default();
        if metadata.category.is_none() || metadata.community.is_none() || metadata.complexity.is_none()
        {
            match self.store.get_item(&request.item_id).await {
                Ok(Some(item)) => {
                    metadata.category = metadata.category.or(item.category);
                    metadata.community = metadata.community.or(item.community);
                    metadata.complexity = metadata.complexity.or(item.complexity);
                }
                Ok(None) => debug!(item_id = %request.item_id, "tracking behavior on unknown item"),
                Err(e) => warn!(item_id = %request.item_id, error = %e, "item lookup failed; tracking without enrichment"),
            }
        }

        let mut event = BehaviorEvent::new(request.user_id, request.item_id, request.action_type)
            .with_metadata(metadata);
        event.duration_seconds = request.duration_seconds;
        event.session_id = request.session_id;

        self.store.append_behavior(&event).await?;
        debug!(
            user_id = %event.user_id,
            item_id = %event.item_id,
            action = %event.action_type,
            "behavior tracked"
        );
        Ok(event)
    }
}
