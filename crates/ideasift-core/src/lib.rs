//! ideasift-core - Core library for ideasift.
//!
//! This crate provides the recommendation strategies, behavior tracking,
//! preference learning, A/B experiment management and statistics behind the
//! ideasift recommendation service.
//!
//! # Example
//!
//! ```ignore
//! use ideasift_core::{EngineConfig, RecommendationService, ActionType, StrategyKind};
//!
//! let config = EngineConfig::builder().in_memory().build();
//! let service = RecommendationService::from_config(config)?;
//!
//! // Record what the user did
//! service.track_behavior("user1", "idea-42", ActionType::Like, None, None).await?;
//!
//! // Ask for recommendations
//! let recs = service.get_recommendations("user1", 10, Some(StrategyKind::Hybrid), None).await;
//! ```

pub mod analytics;
pub mod behavior;
pub mod config;
pub mod error;
pub mod experiment;
pub mod features;
pub mod preference;
pub mod recommend;
pub mod service;
pub mod similarity;
pub mod stats;
pub mod store;
pub mod strategy;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use analytics::{AnalyticsAggregator, AnalyticsDashboardData};
pub use behavior::{BehaviorLog, TrackRequest};
pub use config::{EngineConfig, ExperimentConfig, StoreBackend, StrategyConfig};
pub use error::{ErrorCode, SiftError, SiftResult};
pub use experiment::{ExperimentEvent, ExperimentManager};
pub use recommend::{RecommendationOutcome, RecommendationRequest, Recommender};
pub use service::RecommendationService;
pub use stats::{SignificanceMethod, StatisticalEngine};
pub use store::{open_store, InMemoryStore, SqliteStore};
pub use strategy::{RecommendationStrategy, StrategyContext, StrategyEngine};
pub use traits::DataStore;
pub use types::{
    ActionType, BehaviorEvent, BehaviorMetadata, Experiment, ExperimentAction,
    ExperimentAnalysis, ExperimentStatus, Item, NewExperiment, NoCandidates, ScoredCandidate,
    StrategyKind, SuccessMetric, UserPreferenceVector, Variant,
};
