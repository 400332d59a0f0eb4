//! Persistence collaborators behind the [`ItemStore`] trait.

mod http;
mod memory;
mod sqlite;
mod traits;

use std::sync::Arc;

pub use http::{ApiResponse, HttpItemStore};
pub use memory::{MemoryStore, StoreOp};
pub use sqlite::SqliteItemStore;
pub use traits::{CurrentWeek, DreamCollection, ItemStore, ItemType, ScoreBook, ScoreTotal};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;

/// Build the store selected by `config`.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn ItemStore>, StoreError> {
    let store: Arc<dyn ItemStore> = match config.backend {
        StoreBackend::Sqlite => Arc::new(SqliteItemStore::open()?),
        StoreBackend::Http => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| StoreError::MissingData("store.endpoint".to_string()))?;
            Arc::new(HttpItemStore::new(endpoint, config.token.clone())?)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    tracing::debug!(backend = store.name(), "item store opened");
    Ok(store)
}
