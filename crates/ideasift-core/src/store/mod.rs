//! DataStore implementations.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::SiftResult;
use crate::traits::DataStore;

/// Open the store described by `config`.
pub fn open_store(config: &StoreConfig) -> SiftResult<Arc<dyn DataStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StoreBackend::Sqlite => {
            if let Some(parent) = config.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Ok(Arc::new(SqliteStore::new(&config.path)?))
        }
    }
}
