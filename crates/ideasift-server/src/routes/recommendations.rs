//! Recommendation serving endpoint.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use ideasift_core::types::{ScoredCandidate, StrategyKind};
use ideasift_core::RecommendationRequest;

fn default_limit() -> usize {
    10
}

/// Query parameters for recommendations.
#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub user_id: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub strategy: Option<String>,
    pub diversity_weight: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub user_id: String,
    pub requested_strategy: StrategyKind,
    pub served_strategy: StrategyKind,
    pub recommendations: Vec<ScoredCandidate>,
}

/// Get recommendations for a user.
/// GET /recommendations?user_id=&limit=&strategy=&diversity_weight=
pub async fn get_recommendations(
    State(state): State<AppState>,
    Query(query): Query<RecommendationsQuery>,
) -> ApiResult<Json<RecommendationsResponse>> {
    let user_id = query.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }

    let mut request = RecommendationRequest::new(user_id, query.limit);
    if let Some(name) = query.strategy.as_deref() {
        let kind: StrategyKind = name.parse().map_err(|_| {
            ApiError::validation(format!("Unknown strategy: {}", name)).with_suggestion(
                "Use one of collaborative, content_based, hybrid, trending, \
                 personalized_trending, diversity, serendipity",
            )
        })?;
        request = request.with_strategy(kind);
    }
    if let Some(weight) = query.diversity_weight {
        if !(0.0..=1.0).contains(&weight) {
            return Err(ApiError::validation("diversity_weight must be in [0, 1]"));
        }
        request = request.with_diversity_weight(weight);
    }

    let outcome = state.service.recommend(request).await;

    Ok(Json(RecommendationsResponse {
        user_id: user_id.to_string(),
        requested_strategy: outcome.requested_strategy,
        served_strategy: outcome.served_strategy,
        recommendations: outcome.candidates,
    }))
}
