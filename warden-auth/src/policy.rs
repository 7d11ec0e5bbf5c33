//! Authorization decisions
//!
//! A pure function of the caller's claims and the action being attempted. The
//! action carries every fact the decision needs (target id, whether the target
//! is an administrator, how many other administrators remain), so no IO
//! happens here. Target existence is resolved by the caller before asking.

use crate::token::Claims;
use thiserror::Error;
use warden_core::{AuthFailure, ConflictKind, IdentityId, WardenError};

/// Operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Login,
    CreateIdentity,
    ListIdentities,
    ReadIdentity,
    ReadIdentityIncludingDeleted,
    UpdateIdentity {
        target: IdentityId,
    },
    DeleteIdentity {
        target_is_admin: bool,
        /// Non-deleted administrators other than the target
        other_admins: u64,
    },
    ReadAuditLog,
    SessionInfo,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::CreateIdentity => "create_identity",
            Action::ListIdentities => "list_identities",
            Action::ReadIdentity => "read_identity",
            Action::ReadIdentityIncludingDeleted => "read_identity_including_deleted",
            Action::UpdateIdentity { .. } => "update_identity",
            Action::DeleteIdentity { .. } => "delete_identity",
            Action::ReadAuditLog => "read_audit_log",
            Action::SessionInfo => "session_info",
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("last administrator cannot be deleted")]
    LastAdmin,
}

impl From<PolicyError> for WardenError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Unauthenticated => {
                WardenError::unauthenticated(AuthFailure::MissingOrMalformedHeader)
            }
            PolicyError::Forbidden(action) => WardenError::forbidden(action),
            PolicyError::LastAdmin => WardenError::conflict(ConflictKind::LastAdmin),
        }
    }
}

/// Decide whether `claims` may perform `action`.
///
/// `None` means the caller presented no valid token.
pub fn authorize(claims: Option<&Claims>, action: &Action) -> Result<(), PolicyError> {
    match action {
        // Anonymous entry points
        Action::Login | Action::CreateIdentity => Ok(()),

        Action::ListIdentities | Action::ReadIdentity | Action::SessionInfo => {
            claims.ok_or(PolicyError::Unauthenticated).map(|_| ())
        }

        Action::ReadIdentityIncludingDeleted | Action::ReadAuditLog => {
            require_admin(claims, action)
        }

        Action::UpdateIdentity { target } => {
            let claims = claims.ok_or(PolicyError::Unauthenticated)?;
            if claims.sub == *target || claims.is_admin {
                Ok(())
            } else {
                Err(PolicyError::Forbidden(action.name()))
            }
        }

        Action::DeleteIdentity {
            target_is_admin,
            other_admins,
        } => {
            require_admin(claims, action)?;
            if *target_is_admin && *other_admins == 0 {
                return Err(PolicyError::LastAdmin);
            }
            Ok(())
        }
    }
}

fn require_admin(claims: Option<&Claims>, action: &Action) -> Result<(), PolicyError> {
    let claims = claims.ok_or(PolicyError::Unauthenticated)?;
    if claims.is_admin {
        Ok(())
    } else {
        Err(PolicyError::Forbidden(action.name()))
    }
}
