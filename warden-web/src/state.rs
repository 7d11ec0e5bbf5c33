//! Application state shared by all handlers

use crate::WebResult;
use std::sync::Arc;
use tracing::info;
use warden_core::WardenConfig;
use warden_identity::{open_store, IdentityStore, WardenService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WardenConfig>,
    pub service: Arc<WardenService>,
    store: Arc<dyn IdentityStore>,
}

impl AppState {
    /// Open the configured store and build the service on top of it
    pub async fn new(config: WardenConfig) -> WebResult<Self> {
        let store = open_store(&config.storage).await?;
        info!("Application state initialized");
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: WardenConfig, store: Arc<dyn IdentityStore>) -> Self {
        let service = WardenService::new(store.clone(), &config);
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }
}
