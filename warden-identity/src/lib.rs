//! Warden identity directory
//!
//! Identity lifecycle, the audit trail, and the boundary operations that tie
//! token validation, authorization and the directory together.

pub mod audit;
pub mod directory;
pub mod memory;
pub mod service;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use audit::AuditRecorder;
pub use directory::{Directory, SeedOutcome};
pub use memory::MemoryStore;
pub use service::{LoginOutcome, SessionInfo, WardenService};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{IdentityStore, StoreError, StoreResult, Visibility};

use std::sync::Arc;
use tracing::info;
use warden_core::{StorageConfig, WardenResult};

/// Open the store selected by `config`: SQLite when a database url is set,
/// memory otherwise
pub async fn open_store(config: &StorageConfig) -> WardenResult<Arc<dyn IdentityStore>> {
    match config.database_url.as_deref() {
        None => {
            info!("Using in-memory identity store");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "sqlite")]
        Some(url) => Ok(Arc::new(SqliteStore::connect(url).await?)),
        #[cfg(not(feature = "sqlite"))]
        Some(_) => Err(warden_core::config_error!(
            "storage.database_url is set but the sqlite feature is disabled"
        )),
    }
}
