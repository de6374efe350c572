//! ideasift-server - REST API server for ideasift.
//!
//! This crate exposes the recommendation service, behavior tracking,
//! experiments and the analytics dashboard over HTTP.
//!
//! # Example
//!
//! ```ignore
//! use ideasift_core::{EngineConfig, RecommendationService};
//! use ideasift_server::{create_server, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = RecommendationService::from_config(EngineConfig::default()).unwrap();
//!     let app = create_server(AppState::new(service));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{middleware as axum_middleware, Router};
use tower_http::trace::TraceLayer;

/// Create the server with all routes and middleware.
pub fn create_server(state: AppState) -> Router {
    routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
