//! Core types for ideasift.

mod behavior;
mod candidate;
mod experiment;
mod item;
mod metrics;
mod preference;
mod strategy;

pub use behavior::*;
pub use candidate::*;
pub use experiment::*;
pub use item::*;
pub use metrics::*;
pub use preference::*;
pub use strategy::StrategyKind;
