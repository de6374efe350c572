//! Item catalog endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;
use ideasift_core::types::{Item, ItemFeatureSummary};

fn default_public() -> bool {
    true
}

/// Request body for ingesting an item.
#[derive(Debug, Deserialize)]
pub struct UpsertItemRequest {
    pub id: String,
    pub title: String,
    pub category: Option<String>,
    pub community: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub content_length: usize,
    pub complexity: Option<f64>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    /// Defaults to now.
    pub created_at: Option<DateTime<Utc>>,
}

impl From<UpsertItemRequest> for Item {
    fn from(body: UpsertItemRequest) -> Self {
        let mut item = Item::new(body.id, body.title)
            .with_tags(body.tags)
            .with_content_length(body.content_length);
        item.category = body.category;
        item.community = body.community;
        if let Some(c) = body.complexity {
            item = item.with_complexity(c);
        }
        if let Some(at) = body.created_at {
            item = item.created_at(at);
        }
        item.is_public = body.is_public;
        item
    }
}

/// Insert or replace an item.
/// POST /items
pub async fn upsert_item(
    State(state): State<AppState>,
    Json(body): Json<UpsertItemRequest>,
) -> ApiResult<(StatusCode, Json<Item>)> {
    let item: Item = body.into();
    state.service.upsert_item(&item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Recompute an item's feature summary.
/// POST /items/:id/features
pub async fn refresh_features(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<Json<ItemFeatureSummary>> {
    Ok(Json(state.service.refresh_item_features(&item_id).await?))
}
