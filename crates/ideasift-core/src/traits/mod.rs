//! Core traits for ideasift.

mod data_store;

pub use data_store::DataStore;
pub(crate) use data_store::action_matches;
