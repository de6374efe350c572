//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub version: String,
}

/// Health check endpoint.
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let backend = state.service.config().store.backend;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        store: format!("{:?}", backend).to_lowercase(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
