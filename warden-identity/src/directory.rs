//! User directory: identity lifecycle on top of an [`IdentityStore`]
//!
//! Input is validated here, before any state is touched. Each successful
//! create, update or delete commits exactly one audit entry in the same store
//! unit as the identity write.

use crate::audit::AuditRecorder;
use crate::store::{IdentityStore, Visibility};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use warden_auth::{hash_password, InputPolicy};
use warden_core::{
    AuditAction, ConflictKind, Identity, IdentityFilter, IdentityId, IdentityPatch, NewIdentity,
    Pagination, WardenError, WardenResult, IDENTITY_ENTITY, SYSTEM_ACTOR,
};

/// Result of a bootstrap seed
#[derive(Debug, Clone)]
pub enum SeedOutcome {
    Created(Identity),
    AlreadyPresent(Identity),
}

impl SeedOutcome {
    pub fn identity(&self) -> &Identity {
        match self {
            SeedOutcome::Created(identity) | SeedOutcome::AlreadyPresent(identity) => identity,
        }
    }
}

#[derive(Clone)]
pub struct Directory {
    store: Arc<dyn IdentityStore>,
    input: InputPolicy,
}

impl Directory {
    pub fn new(store: Arc<dyn IdentityStore>, input: InputPolicy) -> Self {
        Self { store, input }
    }

    pub fn input_policy(&self) -> &InputPolicy {
        &self.input
    }

    /// Create a non-administrator identity
    pub async fn create(&self, data: NewIdentity, actor: IdentityId) -> WardenResult<Identity> {
        self.insert(data, false, actor).await
    }

    /// Create an administrator unless a visible identity already owns the email
    pub async fn seed_admin(&self, data: NewIdentity) -> WardenResult<SeedOutcome> {
        let email = self.input.email.normalize(&data.email)?;
        if let Some(existing) = self.store.find_by_email(&email).await? {
            debug!("Seed skipped, {} already present", email);
            return Ok(SeedOutcome::AlreadyPresent(existing));
        }

        let identity = self.insert(data, true, SYSTEM_ACTOR).await?;
        Ok(SeedOutcome::Created(identity))
    }

    async fn insert(
        &self,
        data: NewIdentity,
        is_admin: bool,
        actor: IdentityId,
    ) -> WardenResult<Identity> {
        let data = self.input.check_new(data)?;

        if self.store.find_by_email(&data.email).await?.is_some() {
            return Err(WardenError::conflict(ConflictKind::DuplicateEmail));
        }

        let identity = Identity {
            id: IdentityId::new(),
            name: data.name,
            email: data.email,
            password_hash: hash_password(&data.password)?,
            is_active: true,
            is_admin,
            created_at: Utc::now(),
            deleted_at: None,
        };

        let entry = AuditRecorder::entry(
            AuditAction::Create,
            IDENTITY_ENTITY,
            identity.id.into(),
            actor,
            Some(json!({ "email": identity.email, "is_admin": is_admin })),
        );
        self.store.insert_identity(&identity, &entry).await?;

        info!(identity = %identity.id, actor = %actor, is_admin, "Identity created");
        Ok(identity)
    }

    /// Non-deleted identity by id
    pub async fn get(&self, id: IdentityId) -> WardenResult<Identity> {
        self.find(id, Visibility::Visible).await
    }

    /// Identity by id, soft-deleted included
    pub async fn get_including_deleted(&self, id: IdentityId) -> WardenResult<Identity> {
        self.find(id, Visibility::IncludingDeleted).await
    }

    async fn find(&self, id: IdentityId, visibility: Visibility) -> WardenResult<Identity> {
        self.store
            .find_by_id(id, visibility)
            .await?
            .ok_or_else(|| WardenError::not_found(format!("identity {}", id)))
    }

    /// Non-deleted identity by login email
    pub async fn find_by_email(&self, email: &str) -> WardenResult<Option<Identity>> {
        Ok(self.store.find_by_email(&email.trim().to_lowercase()).await?)
    }

    pub async fn list(
        &self,
        filter: &IdentityFilter,
        page: Pagination,
    ) -> WardenResult<Vec<Identity>> {
        Ok(self.store.list(filter, page).await?)
    }

    /// Apply the fields present in `patch`; the admin flag is not patchable
    pub async fn update(
        &self,
        id: IdentityId,
        patch: IdentityPatch,
        actor: IdentityId,
    ) -> WardenResult<Identity> {
        let patch = self.input.check_patch(patch)?;
        let mut identity = self.get(id).await?;

        if let Some(email) = &patch.email {
            if *email != identity.email {
                let taken = self
                    .store
                    .find_by_email(email)
                    .await?
                    .is_some_and(|other| other.id != id);
                if taken {
                    return Err(WardenError::conflict(ConflictKind::DuplicateEmail));
                }
            }
        }

        let changed = patch.changed_fields();
        if let Some(name) = patch.name {
            identity.name = name;
        }
        if let Some(email) = patch.email {
            identity.email = email;
        }
        if let Some(is_active) = patch.is_active {
            identity.is_active = is_active;
        }
        if let Some(password) = patch.password {
            identity.password_hash = hash_password(&password)?;
        }

        let entry = AuditRecorder::entry(
            AuditAction::Update,
            IDENTITY_ENTITY,
            id.into(),
            actor,
            Some(json!({ "changed": changed })),
        );
        self.store.update_identity(&identity, &entry).await?;

        info!(identity = %id, actor = %actor, fields = ?changed, "Identity updated");
        Ok(identity)
    }

    /// Soft-delete; refuses to remove the last non-deleted administrator
    pub async fn delete(&self, id: IdentityId, actor: IdentityId) -> WardenResult<Identity> {
        let target = self.get(id).await?;

        let entry = AuditRecorder::entry(
            AuditAction::Delete,
            IDENTITY_ENTITY,
            id.into(),
            actor,
            Some(json!({ "email": target.email })),
        );
        let deleted = self.store.soft_delete_identity(id, Utc::now(), &entry).await?;

        info!(identity = %id, actor = %actor, "Identity soft-deleted");
        Ok(deleted)
    }

    /// Non-deleted administrators other than `id`
    pub async fn count_admins_excluding(&self, id: IdentityId) -> WardenResult<u64> {
        Ok(self.store.count_admins_excluding(id).await?)
    }
}
