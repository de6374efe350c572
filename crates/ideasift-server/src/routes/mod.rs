//! Route definitions for the REST API.

mod behaviors;
mod dashboard;
mod experiments;
mod health;
mod items;
mod recommendations;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Serving
        .route("/recommendations", get(recommendations::get_recommendations))
        .route("/behaviors", post(behaviors::track_behavior))
        // Experiments
        .route("/experiments", post(experiments::create_experiment))
        .route("/experiments/:id", get(experiments::get_experiment))
        .route("/experiments/:id/status", post(experiments::transition_experiment))
        .route(
            "/experiments/:id/traffic-split",
            put(experiments::update_traffic_split),
        )
        .route("/experiments/:id/assignment", get(experiments::get_assignment))
        .route("/experiments/:id/events", post(experiments::log_event))
        .route("/experiments/:id/analysis", get(experiments::analyze_experiment))
        // Analytics
        .route("/dashboard", get(dashboard::get_dashboard))
        // Catalog
        .route("/items", post(items::upsert_item))
        .route("/items/:id/features", post(items::refresh_features))
        // Attach state
        .with_state(state)
}

pub use behaviors::*;
pub use dashboard::*;
pub use experiments::*;
pub use health::*;
pub use items::*;
pub use recommendations::*;
