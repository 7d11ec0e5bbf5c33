//! Boundary operations
//!
//! Every operation takes the caller's claims explicitly (`None` when no valid
//! token was presented) and runs its checks in a fixed order: authentication,
//! then target existence, then permission, then input validation.

use crate::audit::AuditRecorder;
use crate::directory::{Directory, SeedOutcome};
use crate::store::IdentityStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use warden_auth::{
    authorize, dummy_verify, verify_password, Action, Claims, InputPolicy, PolicyError,
    TokenService,
};
use warden_core::{
    AuditEntry, AuthFailure, ErrorKind, Identity, IdentityFilter, IdentityId, IdentityPatch,
    NewIdentity, Pagination, WardenConfig, WardenError, WardenResult, SYSTEM_ACTOR,
};

/// Successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub subject_id: IdentityId,
    pub email: String,
    pub is_admin: bool,
    pub expires_at: DateTime<Utc>,
}

/// Details of the session behind a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub user_id: IdentityId,
    pub email: String,
    pub is_admin: bool,
    pub expires_at: DateTime<Utc>,
}

fn require_claims(claims: Option<&Claims>) -> Result<&Claims, PolicyError> {
    claims.ok_or(PolicyError::Unauthenticated)
}

#[derive(Clone)]
pub struct WardenService {
    tokens: Arc<TokenService>,
    directory: Directory,
    audit: AuditRecorder,
    token_ttl: Duration,
}

impl WardenService {
    pub fn new(store: Arc<dyn IdentityStore>, config: &WardenConfig) -> Self {
        let tokens = Arc::new(TokenService::new(config.auth.secret().as_bytes()));
        let input = InputPolicy::from(&config.policy);
        Self::from_parts(store, tokens, input, config.auth.token_ttl())
    }

    pub fn from_parts(
        store: Arc<dyn IdentityStore>,
        tokens: Arc<TokenService>,
        input: InputPolicy,
        token_ttl: Duration,
    ) -> Self {
        Self {
            tokens,
            directory: Directory::new(store.clone(), input),
            audit: AuditRecorder::new(store),
            token_ttl,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Exchange credentials for a session token.
    ///
    /// Unknown email, wrong password and inactive account are indistinguishable.
    pub async fn login(&self, email: &str, password: &str) -> WardenResult<LoginOutcome> {
        authorize(None, &Action::Login)?;

        let identity = match self.directory.find_by_email(email).await? {
            Some(identity) => identity,
            None => {
                dummy_verify(password);
                warn!("Login rejected");
                return Err(WardenError::invalid_credentials());
            }
        };

        if !verify_password(password, &identity.password_hash) || !identity.is_active {
            warn!("Login rejected");
            return Err(WardenError::invalid_credentials());
        }

        let issued = self
            .tokens
            .issue(identity.id, identity.is_admin, self.token_ttl, Utc::now())?;
        let expires_at = issued
            .claims
            .expires_at()
            .ok_or_else(|| WardenError::internal("token expiry out of range"))?;

        info!(identity = %identity.id, "Login succeeded");
        Ok(LoginOutcome {
            token: issued.token,
            subject_id: identity.id,
            email: identity.email,
            is_admin: identity.is_admin,
            expires_at,
        })
    }

    /// Validate a raw `Authorization` header value against the current time
    pub fn validate_bearer(&self, raw_header: Option<&str>) -> WardenResult<Claims> {
        self.tokens.validate_bearer(raw_header, Utc::now())
    }

    /// Self-service registration; the result is never an administrator
    pub async fn create_identity(&self, data: NewIdentity) -> WardenResult<Identity> {
        authorize(None, &Action::CreateIdentity)?;
        self.directory.create(data, SYSTEM_ACTOR).await
    }

    pub async fn list_identities(
        &self,
        claims: Option<&Claims>,
        filter: &IdentityFilter,
        page: Pagination,
    ) -> WardenResult<Vec<Identity>> {
        authorize(claims, &Action::ListIdentities)?;
        self.directory.list(filter, page).await
    }

    pub async fn get_identity(
        &self,
        claims: Option<&Claims>,
        id: IdentityId,
    ) -> WardenResult<Identity> {
        authorize(claims, &Action::ReadIdentity)?;
        self.directory.get(id).await
    }

    /// Administrator read that also returns soft-deleted identities
    pub async fn get_identity_including_deleted(
        &self,
        claims: Option<&Claims>,
        id: IdentityId,
    ) -> WardenResult<Identity> {
        let claims = require_claims(claims)?;
        let identity = self.directory.get_including_deleted(id).await?;
        authorize(Some(claims), &Action::ReadIdentityIncludingDeleted)?;
        Ok(identity)
    }

    pub async fn update_identity(
        &self,
        claims: Option<&Claims>,
        id: IdentityId,
        patch: IdentityPatch,
    ) -> WardenResult<Identity> {
        let claims = require_claims(claims)?;
        self.directory.get(id).await?;
        authorize(Some(claims), &Action::UpdateIdentity { target: id })?;
        self.directory.update(id, patch, claims.sub).await
    }

    pub async fn delete_identity(
        &self,
        claims: Option<&Claims>,
        id: IdentityId,
    ) -> WardenResult<Identity> {
        let claims = require_claims(claims)?;
        let target = self.directory.get(id).await?;
        let other_admins = if target.is_admin {
            self.directory.count_admins_excluding(id).await?
        } else {
            0
        };

        authorize(
            Some(claims),
            &Action::DeleteIdentity {
                target_is_admin: target.is_admin,
                other_admins,
            },
        )?;
        self.directory.delete(id, claims.sub).await
    }

    /// Whole audit trail, newest first
    pub async fn list_audit_log(&self, claims: Option<&Claims>) -> WardenResult<Vec<AuditEntry>> {
        authorize(claims, &Action::ReadAuditLog)?;
        self.audit.list_all().await
    }

    pub async fn session_info(&self, claims: Option<&Claims>) -> WardenResult<SessionInfo> {
        let claims = require_claims(claims)?;
        authorize(Some(claims), &Action::SessionInfo)?;

        let identity = self.directory.get(claims.sub).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => WardenError::unauthenticated(AuthFailure::InvalidToken),
            _ => e,
        })?;
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| WardenError::unauthenticated(AuthFailure::InvalidToken))?;

        Ok(SessionInfo {
            user_id: identity.id,
            email: identity.email,
            is_admin: claims.is_admin,
            expires_at,
        })
    }

    /// Bootstrap an administrator (no token involved)
    pub async fn seed_admin(&self, data: NewIdentity) -> WardenResult<SeedOutcome> {
        self.directory.seed_admin(data).await
    }
}
