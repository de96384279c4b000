//! [`TaskStore`] backends.

mod file;
mod memory;
mod sqlite;

pub use file::FileTaskStore;
pub use memory::MemoryTaskStore;
pub use sqlite::SqliteTaskStore;

use crate::config::{PersistenceConfig, StoreBackend};
use std::sync::Arc;
use switchboard_core::{SwitchboardError, SwitchboardResult, TaskStore};
use tracing::info;

/// Open the backend selected in configuration.
pub async fn open_store(config: &PersistenceConfig) -> SwitchboardResult<Arc<dyn TaskStore>> {
    let require_path = || {
        config
            .path
            .clone()
            .ok_or_else(|| SwitchboardError::Config("persistence.path is required".into()))
    };
    let store: Arc<dyn TaskStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryTaskStore::new()),
        StoreBackend::File => Arc::new(FileTaskStore::new(require_path()?).await?),
        StoreBackend::Sqlite => Arc::new(SqliteTaskStore::open(require_path()?).await?),
    };
    info!(backend = ?config.backend, "Task store opened");
    Ok(store)
}
