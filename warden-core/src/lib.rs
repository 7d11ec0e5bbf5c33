//! Warden Core - shared building blocks for the identity-and-access core
//!
//! This crate defines the domain types, the error taxonomy, configuration
//! loading and logging setup used by every other Warden crate.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;

// Re-export commonly used external types
pub use tracing;
