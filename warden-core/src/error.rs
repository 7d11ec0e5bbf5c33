//! Unified error handling system
//!
//! Every core operation returns a typed [`WardenError`]. Callers (the HTTP layer,
//! the CLI) decide how to present each [`ErrorKind`]; the core never swallows an
//! authorization or storage failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

pub type WardenResult<T> = Result<T, WardenError>;

/// Input policy that was violated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    /// Password does not satisfy the strength policy
    WeakPassword,
    /// Email is outside the configured institutional domain
    NonInstitutionalEmail,
    /// Any other malformed input (empty name, bad pagination, zero ttl...)
    InvalidInput,
}

impl std::fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationKind::WeakPassword => write!(f, "weak_password"),
            ValidationKind::NonInstitutionalEmail => write!(f, "non_institutional_email"),
            ValidationKind::InvalidInput => write!(f, "invalid_input"),
        }
    }
}

/// Why a caller is not authenticated.
///
/// The variants are deliberately coarse: an expired token, a bad signature and a
/// garbled payload all collapse into `InvalidToken`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
    /// No `Authorization` header, or not of the form `Bearer <token>`
    MissingOrMalformedHeader,
    /// Token failed signature, shape or expiry checks
    InvalidToken,
    /// Login rejected (unknown email and wrong password are indistinguishable)
    InvalidCredentials,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::MissingOrMalformedHeader => write!(f, "missing or malformed header"),
            AuthFailure::InvalidToken => write!(f, "invalid token"),
            AuthFailure::InvalidCredentials => write!(f, "invalid credentials"),
        }
    }
}

/// State conflicts detected against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Another non-deleted identity already uses the email
    DuplicateEmail,
    /// The operation would leave no non-deleted administrator
    LastAdmin,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::DuplicateEmail => write!(f, "duplicate email"),
            ConflictKind::LastAdmin => write!(f, "last administrator cannot be deleted"),
        }
    }
}

/// Coarse error category, used by transports for status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Storage,
    Config,
    Internal,
}

/// Main error type for the Warden system
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Validation error: {message}")]
    Validation {
        kind: ValidationKind,
        message: String,
    },

    #[error("Authentication error: {reason}")]
    Unauthenticated { reason: AuthFailure },

    #[error("Forbidden: {action}")]
    Forbidden { action: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Conflict: {kind}")]
    Conflict { kind: ConflictKind },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WardenError {
    pub fn validation(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::validation(ValidationKind::InvalidInput, message)
    }

    pub fn unauthenticated(reason: AuthFailure) -> Self {
        Self::Unauthenticated { reason }
    }

    pub fn invalid_credentials() -> Self {
        Self::Unauthenticated {
            reason: AuthFailure::InvalidCredentials,
        }
    }

    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(kind: ConflictKind) -> Self {
        Self::Conflict { kind }
    }

    pub fn storage(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the coarse category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            WardenError::Validation { .. } => ErrorKind::Validation,
            WardenError::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            WardenError::Forbidden { .. } => ErrorKind::Forbidden,
            WardenError::NotFound { .. } => ErrorKind::NotFound,
            WardenError::Conflict { .. } => ErrorKind::Conflict,
            WardenError::Storage { .. } => ErrorKind::Storage,
            WardenError::Config { .. } => ErrorKind::Config,
            WardenError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            WardenError::Validation { kind, .. } => match kind {
                ValidationKind::WeakPassword => "weak_password",
                ValidationKind::NonInstitutionalEmail => "non_institutional_email",
                ValidationKind::InvalidInput => "invalid_input",
            },
            WardenError::Unauthenticated { reason } => match reason {
                AuthFailure::MissingOrMalformedHeader => "missing_auth_header",
                AuthFailure::InvalidToken => "invalid_token",
                AuthFailure::InvalidCredentials => "invalid_credentials",
            },
            WardenError::Forbidden { .. } => "forbidden",
            WardenError::NotFound { .. } => "not_found",
            WardenError::Conflict { kind } => match kind {
                ConflictKind::DuplicateEmail => "duplicate_email",
                ConflictKind::LastAdmin => "last_admin",
            },
            WardenError::Storage { .. } => "storage_failure",
            WardenError::Config { .. } => "config_error",
            WardenError::Internal { .. } => "internal_error",
        }
    }

    /// Check if the caller can recover by correcting and resubmitting the request.
    ///
    /// Storage failures are not retried by the core and are reported as fatal.
    pub fn is_recoverable(&self) -> bool {
        match self {
            WardenError::Validation { .. } => true,
            WardenError::Unauthenticated { .. } => true,
            WardenError::Conflict { .. } => true,
            WardenError::Forbidden { .. } => false,
            WardenError::NotFound { .. } => false,
            WardenError::Storage { .. } => false,
            WardenError::Config { .. } => false,
            WardenError::Internal { .. } => false,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            WardenError::Storage { .. } | WardenError::Internal { .. } => {
                error!(code = self.code(), error = %self, "Core operation failed");
            }
            WardenError::Config { .. } => {
                error!(code = self.code(), error = %self, "Configuration error");
            }
            WardenError::Unauthenticated { .. } | WardenError::Forbidden { .. } => {
                warn!(code = self.code(), error = %self, "Access denied");
            }
            _ => {
                debug!(code = self.code(), error = %self, "Request rejected");
            }
        }
    }
}

/// Convenience macros for creating errors
#[macro_export]
macro_rules! validation_error {
    ($kind:expr, $msg:expr) => {
        $crate::WardenError::Validation {
            kind: $kind,
            message: $msg.to_string(),
        }
    };
}

#[macro_export]
macro_rules! storage_error {
    ($msg:expr) => {
        $crate::WardenError::Storage {
            message: $msg.to_string(),
            source: None,
        }
    };
    ($msg:expr, $source:expr) => {
        $crate::WardenError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::WardenError::Config {
            message: $msg.to_string(),
            source: None,
        }
    };
    ($msg:expr, $source:expr) => {
        $crate::WardenError::Config {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
        }
    };
}
