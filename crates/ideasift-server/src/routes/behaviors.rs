//! Behavior tracking endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;
use ideasift_core::types::{ActionType, BehaviorEvent, BehaviorMetadata};
use ideasift_core::TrackRequest;

/// Request body for tracking a behavior.
#[derive(Debug, Deserialize)]
pub struct TrackBehaviorRequest {
    pub user_id: String,
    pub item_id: String,
    pub action_type: ActionType,
    pub duration_seconds: Option<f64>,
    pub session_id: Option<String>,
    pub metadata: Option<BehaviorMetadata>,
}

impl From<TrackBehaviorRequest> for TrackRequest {
    fn from(body: TrackBehaviorRequest) -> Self {
        let mut request = TrackRequest::new(body.user_id, body.item_id, body.action_type);
        request.duration_seconds = body.duration_seconds;
        request.session_id = body.session_id;
        request.metadata = body.metadata;
        request
    }
}

/// Track a user action.
/// POST /behaviors
pub async fn track_behavior(
    State(state): State<AppState>,
    Json(body): Json<TrackBehaviorRequest>,
) -> ApiResult<(StatusCode, Json<BehaviorEvent>)> {
    let event = state.service.track(body.into()).await?;
    Ok((StatusCode::CREATED, Json(event)))
}
