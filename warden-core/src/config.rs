//! Configuration management

use crate::error::{WardenError, WardenResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Signing secret used when none is configured. Only acceptable for development.
pub const DEV_JWT_SECRET: &str = "warden-default-secret-change-in-production";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub auth: AuthConfig,
    pub policy: PolicyConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// Administrator ensured at server startup, if configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminSeedConfig>,
}

/// Token signing configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Process-wide HMAC secret; rotating it invalidates every outstanding token
    pub jwt_secret: Option<String>,
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_minutes: 30,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

impl AuthConfig {
    /// Secret to sign with, falling back to the development default
    pub fn secret(&self) -> &str {
        match self.jwt_secret.as_deref() {
            Some(secret) => secret,
            None => {
                warn!("jwt_secret not set; using insecure dev default");
                DEV_JWT_SECRET
            }
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.token_ttl_minutes)
    }
}

/// Input policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Emails must belong to this domain
    pub institutional_domain: String,
    /// Single email literal accepted outside the domain (bootstrap/testing)
    pub bootstrap_email: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            institutional_domain: "perlametro.cl".to_string(),
            bootstrap_email: Some("admin@example.com".to_string()),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `sqlite:` URL; `None` selects the in-memory store
    pub database_url: Option<String>,
}

fn default_admin_name() -> String {
    "Admin User".to_string()
}

/// Bootstrap administrator credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct AdminSeedConfig {
    #[serde(default = "default_admin_name")]
    pub name: String,
    pub email: String,
    pub password: String,
}

impl AdminSeedConfig {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: default_admin_name(),
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for AdminSeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeedConfig")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl WardenConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> WardenResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WardenError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
        })?;

        let config: WardenConfig = toml::from_str(&content).map_err(|e| WardenError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> WardenResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| WardenError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
        })?;

        std::fs::write(path, content).map_err(|e| WardenError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
        })?;

        Ok(())
    }

    /// Apply `WARDEN_*` environment overrides (a `.env` file is read first)
    pub fn with_env_overrides(mut self) -> WardenResult<Self> {
        dotenvy::dotenv().ok();
        self.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> WardenResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("WARDEN_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(ttl) = lookup("WARDEN_TOKEN_TTL_MINUTES") {
            self.auth.token_ttl_minutes = ttl.parse().map_err(|e| WardenError::Config {
                message: format!("WARDEN_TOKEN_TTL_MINUTES is not an integer: {}", ttl),
                source: Some(Box::new(e)),
            })?;
        }
        if let Some(domain) = lookup("WARDEN_INSTITUTIONAL_DOMAIN") {
            self.policy.institutional_domain = domain;
        }
        if let Some(email) = lookup("WARDEN_BOOTSTRAP_EMAIL") {
            // An empty value disables the exception
            self.policy.bootstrap_email = Some(email).filter(|e| !e.is_empty());
        }
        if let Some(url) = lookup("WARDEN_DATABASE_URL") {
            self.storage.database_url = Some(url);
        }
        if let Some(host) = lookup("WARDEN_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("WARDEN_PORT") {
            self.server.port = port.parse().map_err(|e| WardenError::Config {
                message: format!("WARDEN_PORT is not a valid port: {}", port),
                source: Some(Box::new(e)),
            })?;
        }
        match (lookup("WARDEN_ADMIN_EMAIL"), lookup("WARDEN_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => {
                let mut admin = AdminSeedConfig::new(email, password);
                if let Some(name) = lookup("WARDEN_ADMIN_NAME") {
                    admin.name = name;
                }
                self.admin = Some(admin);
            }
            (None, None) => {}
            _ => {
                return Err(WardenError::Config {
                    message: "WARDEN_ADMIN_EMAIL and WARDEN_ADMIN_PASSWORD must be set together"
                        .to_string(),
                    source: None,
                });
            }
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> WardenResult<()> {
        if matches!(self.auth.jwt_secret.as_deref(), Some("")) {
            return Err(WardenError::Config {
                message: "auth.jwt_secret must not be empty".to_string(),
                source: None,
            });
        }

        if self.auth.token_ttl_minutes <= 0 {
            return Err(WardenError::Config {
                message: "auth.token_ttl_minutes must be greater than 0".to_string(),
                source: None,
            });
        }

        if let Some(admin) = &self.admin {
            if admin.email.trim().is_empty() || admin.password.is_empty() {
                return Err(WardenError::Config {
                    message: "admin.email and admin.password must not be empty".to_string(),
                    source: None,
                });
            }
        }

        let domain = self.policy.institutional_domain.trim();
        if domain.is_empty() || domain.contains('@') {
            return Err(WardenError::Config {
                message: "policy.institutional_domain must be a bare domain name".to_string(),
                source: None,
            });
        }

        Ok(())
    }
}
