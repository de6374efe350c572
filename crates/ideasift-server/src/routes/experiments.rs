//! Experiment endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use ideasift_core::experiment::ExperimentEvent;
use ideasift_core::types::{
    Experiment, ExperimentAction, ExperimentAnalysis, ExperimentStatus, NewExperiment,
    PerformanceMetadata, StrategyKind, Variant,
};

/// Create a draft experiment.
/// POST /experiments
pub async fn create_experiment(
    State(state): State<AppState>,
    Json(body): Json<NewExperiment>,
) -> ApiResult<(StatusCode, Json<Experiment>)> {
    let experiment = state.service.create_experiment(body).await?;
    Ok((StatusCode::CREATED, Json(experiment)))
}

/// Get an experiment.
/// GET /experiments/:id
pub async fn get_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Experiment>> {
    Ok(Json(state.service.get_experiment(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: ExperimentStatus,
}

/// Move an experiment along its lifecycle.
/// POST /experiments/:id/status
pub async fn transition_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TransitionRequest>,
) -> ApiResult<Json<Experiment>> {
    Ok(Json(
        state
            .service
            .transition_experiment(&id, body.status)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct TrafficSplitRequest {
    pub traffic_split: f64,
}

/// Change the split for future assignments.
/// PUT /experiments/:id/traffic-split
pub async fn update_traffic_split(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TrafficSplitRequest>,
) -> ApiResult<Json<Experiment>> {
    Ok(Json(
        state
            .service
            .update_traffic_split(&id, body.traffic_split)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct AssignmentQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub experiment_id: String,
    pub user_id: String,
    pub variant: Variant,
    pub strategy: StrategyKind,
}

/// Sticky variant for a user.
/// GET /experiments/:id/assignment?user_id=
pub async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AssignmentQuery>,
) -> ApiResult<Json<AssignmentResponse>> {
    if query.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }
    let experiment = state.service.get_experiment(&id).await?;
    let variant = state.service.assign_variant(&query.user_id, &id).await;

    Ok(Json(AssignmentResponse {
        strategy: experiment.strategy_for(variant),
        experiment_id: id,
        user_id: query.user_id,
        variant,
    }))
}

/// Request body for logging an experiment event.
#[derive(Debug, Deserialize)]
pub struct LogEventRequest {
    pub user_id: String,
    pub variant: Variant,
    pub action: ExperimentAction,
    pub item_id: String,
    pub position_in_list: Option<u32>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: PerformanceMetadata,
}

#[derive(Debug, Serialize)]
pub struct LogEventResponse {
    pub logged: bool,
}

/// Log an experiment-attributed action.
/// POST /experiments/:id/events
pub async fn log_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<LogEventRequest>,
) -> ApiResult<(StatusCode, Json<LogEventResponse>)> {
    let mut event = ExperimentEvent::new(id, body.user_id, body.variant, body.action, body.item_id)
        .with_metadata(body.metadata);
    event.position_in_list = body.position_in_list;
    event.session_id = body.session_id;

    state.service.log_experiment_event(event).await?;
    Ok((StatusCode::CREATED, Json(LogEventResponse { logged: true })))
}

/// Analyze an experiment and persist the test results.
/// GET /experiments/:id/analysis
pub async fn analyze_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExperimentAnalysis>> {
    Ok(Json(state.service.analyze_experiment(&id).await?))
}
