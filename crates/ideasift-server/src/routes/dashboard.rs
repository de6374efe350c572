//! Analytics dashboard endpoint.

use axum::{extract::State, Json};

use crate::error::ApiResult;
use crate::state::AppState;
use ideasift_core::AnalyticsDashboardData;

/// Dashboard data for the trailing week.
/// GET /dashboard
pub async fn get_dashboard(
    State(state): State<AppState>,
) -> ApiResult<Json<AnalyticsDashboardData>> {
    Ok(Json(state.service.get_dashboard_data().await?))
}
