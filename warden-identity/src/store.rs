//! Identity persistence backends
//!
//! Every write is one atomic unit that also appends the audit entry describing
//! it. Invariants that must hold at commit time (email uniqueness, target
//! visibility, the last administrator) are re-checked inside that unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use warden_core::{
    AuditEntry, ConflictKind, Identity, IdentityFilter, IdentityId, Pagination, WardenError,
};

/// Store operation result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Which identities a lookup may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Non-deleted identities only
    Visible,
    /// Soft-deleted identities too (privileged reads)
    IncludingDeleted,
}

impl Visibility {
    pub fn admits(&self, identity: &Identity) -> bool {
        match self {
            Visibility::Visible => !identity.is_deleted(),
            Visibility::IncludingDeleted => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already in use")]
    EmailTaken,

    #[error("identity not found")]
    NotFound,

    #[error("no other administrator would remain")]
    LastAdmin,

    #[error("store unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    pub fn unavailable(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<StoreError> for WardenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmailTaken => WardenError::conflict(ConflictKind::DuplicateEmail),
            StoreError::NotFound => WardenError::not_found("identity"),
            StoreError::LastAdmin => WardenError::conflict(ConflictKind::LastAdmin),
            StoreError::Unavailable { message, source } => WardenError::Storage { message, source },
        }
    }
}

/// Persistence seam for identities and their audit trail
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up an identity by id
    async fn find_by_id(
        &self,
        id: IdentityId,
        visibility: Visibility,
    ) -> StoreResult<Option<Identity>>;

    /// Look up a non-deleted identity by its normalized email
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>>;

    /// Non-deleted identities matching `filter`, ordered by (created_at, id)
    async fn list(&self, filter: &IdentityFilter, page: Pagination) -> StoreResult<Vec<Identity>>;

    /// Number of non-deleted administrators other than `id`
    async fn count_admins_excluding(&self, id: IdentityId) -> StoreResult<u64>;

    /// Insert a new identity together with its audit entry
    async fn insert_identity(&self, identity: &Identity, audit: &AuditEntry) -> StoreResult<()>;

    /// Replace a non-deleted identity's mutable fields together with its audit entry
    async fn update_identity(&self, identity: &Identity, audit: &AuditEntry) -> StoreResult<()>;

    /// Mark an identity deleted together with its audit entry.
    ///
    /// Fails with `LastAdmin` when the target is the only non-deleted administrator.
    async fn soft_delete_identity(
        &self,
        id: IdentityId,
        deleted_at: DateTime<Utc>,
        audit: &AuditEntry,
    ) -> StoreResult<Identity>;

    /// Append a standalone audit entry
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()>;

    /// All audit entries, newest first
    async fn list_audit(&self) -> StoreResult<Vec<AuditEntry>>;

    /// Health check for the storage backend
    async fn health_check(&self) -> StoreResult<()>;
}
