//! Warden
//!
//! Identity and access server: `warden serve` runs the HTTP interface,
//! `warden seed` bootstraps an administrator.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use warden_core::{init_logging, AdminSeedConfig, WardenConfig};
use warden_web::{seed_admin, AppState, WardenServerBuilder};

/// Warden - identity and access server
#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Identity, session tokens and audit trail")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database URL (overrides config and environment)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Server host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Server port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Administrator to create at startup (requires --admin-password)
        #[arg(long, requires = "admin_password")]
        admin_email: Option<String>,

        #[arg(long, requires = "admin_email")]
        admin_password: Option<String>,
    },
    /// Create the bootstrap administrator if it does not exist
    Seed {
        #[arg(long, default_value = "Admin User")]
        name: String,

        #[arg(long, default_value = "admin@perlametro.cl")]
        email: String,

        #[arg(long)]
        password: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<WardenConfig> {
    let config = match &cli.config {
        Some(path) => WardenConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => WardenConfig::default(),
    };

    let mut config = config.with_env_overrides()?;
    if let Some(url) = &cli.database_url {
        config.storage.database_url = Some(url.clone());
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("initializing logging: {}", e))?;

    match cli.command {
        Command::Serve {
            host,
            port,
            admin_email,
            admin_password,
        } => {
            let mut builder = WardenServerBuilder::new().config(config);
            if let Some(host) = host {
                builder = builder.host(host);
            }
            if let Some(port) = port {
                builder = builder.port(port);
            }
            if let (Some(email), Some(password)) = (admin_email, admin_password) {
                builder = builder.admin(email, password);
            }

            let server = builder.build().await?;
            server.start().await?;
        }
        Command::Seed {
            name,
            email,
            password,
        } => {
            if config.storage.database_url.is_none() {
                warn!(
                    "Seeding the in-memory store; the administrator is lost on exit. \
                     Use `serve --admin-email --admin-password` instead"
                );
            }

            let admin = AdminSeedConfig {
                name,
                email,
                password,
            };
            let state = AppState::new(config).await?;
            seed_admin(&state, &admin).await?;
        }
    }

    Ok(())
}
