//! Warden Web Server
//!
//! Main web server implementation using Axum.

use crate::{create_app, AppState, WebError, WebResult};
use axum::serve;
use tokio::net::TcpListener;
use tracing::{error, info};
use warden_core::{AdminSeedConfig, NewIdentity, WardenConfig};
use warden_identity::SeedOutcome;

/// Main Warden web server
pub struct WardenServer {
    config: WardenConfig,
    state: AppState,
}

impl WardenServer {
    /// Create a new server, opening the configured store and ensuring the
    /// configured administrator exists in it
    pub async fn new(config: WardenConfig) -> WebResult<Self> {
        let state = AppState::new(config.clone()).await?;
        if let Some(admin) = &config.admin {
            seed_admin(&state, admin).await?;
        }
        Ok(Self { config, state })
    }

    /// Start the web server
    pub async fn start(self) -> WebResult<()> {
        let address = self.config.server.address();

        info!("Starting Warden server");
        if self.config.storage.database_url.is_none() {
            info!("No database configured; identities will not survive a restart");
        }

        let app = create_app(self.state.clone());

        let listener = TcpListener::bind(&address)
            .await
            .map_err(WebError::Server)?;

        info!("Server listening on http://{}", address);

        if let Err(e) = serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!("Server error: {}", e);
            return Err(WebError::Server(e));
        }

        info!("Server stopped");
        Ok(())
    }

    /// Get server configuration
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Get application state
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Create the administrator described by `admin` unless it already exists
pub async fn seed_admin(state: &AppState, admin: &AdminSeedConfig) -> WebResult<()> {
    let outcome = state
        .service
        .seed_admin(NewIdentity {
            name: admin.name.clone(),
            email: admin.email.clone(),
            password: admin.password.clone(),
            is_admin: None,
        })
        .await?;

    match outcome {
        SeedOutcome::Created(identity) => {
            info!(identity = %identity.id, email = %identity.email, "Administrator created");
        }
        SeedOutcome::AlreadyPresent(identity) => {
            info!(identity = %identity.id, email = %identity.email, "Administrator already present");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// Builder for WardenServer
pub struct WardenServerBuilder {
    config: WardenConfig,
}

impl WardenServerBuilder {
    pub fn new() -> Self {
        Self {
            config: WardenConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: WardenConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the server host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.server.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set database URL
    pub fn database_url<S: Into<String>>(mut self, database_url: S) -> Self {
        self.config.storage.database_url = Some(database_url.into());
        self
    }

    /// Ensure an administrator with these credentials exists at startup
    pub fn admin<S: Into<String>>(mut self, email: S, password: S) -> Self {
        self.config.admin = Some(AdminSeedConfig::new(email, password));
        self
    }

    /// Validate the configuration and build the server
    pub async fn build(self) -> WebResult<WardenServer> {
        self.config.validate()?;
        WardenServer::new(self.config).await
    }
}

impl Default for WardenServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
