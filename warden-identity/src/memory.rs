//! In-memory identity store

use crate::store::{IdentityStore, StoreError, StoreResult, Visibility};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use warden_core::{AuditEntry, Identity, IdentityFilter, IdentityId, Pagination};

#[derive(Default)]
struct MemoryState {
    identities: HashMap<IdentityId, Identity>,
    /// Insertion order
    audit: Vec<AuditEntry>,
}

impl MemoryState {
    fn email_taken(&self, email: &str, except: IdentityId) -> bool {
        self.identities
            .values()
            .any(|other| other.id != except && !other.is_deleted() && other.email == email)
    }

    fn admins_excluding(&self, id: IdentityId) -> u64 {
        self.identities
            .values()
            .filter(|other| other.id != id && other.is_admin && !other.is_deleted())
            .count() as u64
    }
}

/// Identity store held entirely in process memory.
///
/// Each write holds the write lock for the whole unit, so the identity change
/// and its audit entry become visible together.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_by_id(
        &self,
        id: IdentityId,
        visibility: Visibility,
    ) -> StoreResult<Option<Identity>> {
        let state = self.state.read().await;
        Ok(state
            .identities
            .get(&id)
            .filter(|identity| visibility.admits(identity))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let state = self.state.read().await;
        Ok(state
            .identities
            .values()
            .find(|identity| !identity.is_deleted() && identity.email == email)
            .cloned())
    }

    async fn list(&self, filter: &IdentityFilter, page: Pagination) -> StoreResult<Vec<Identity>> {
        let state = self.state.read().await;
        let mut matches: Vec<&Identity> = state
            .identities
            .values()
            .filter(|identity| !identity.is_deleted() && filter.matches(identity))
            .collect();
        matches.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        Ok(matches
            .into_iter()
            .skip(page.skip as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn count_admins_excluding(&self, id: IdentityId) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.admins_excluding(id))
    }

    async fn insert_identity(&self, identity: &Identity, audit: &AuditEntry) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.email_taken(&identity.email, identity.id) {
            return Err(StoreError::EmailTaken);
        }
        state.identities.insert(identity.id, identity.clone());
        state.audit.push(audit.clone());
        debug!("Inserted identity {} into memory store", identity.id);
        Ok(())
    }

    async fn update_identity(&self, identity: &Identity, audit: &AuditEntry) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let visible = state
            .identities
            .get(&identity.id)
            .is_some_and(|current| !current.is_deleted());
        if !visible {
            return Err(StoreError::NotFound);
        }
        if state.email_taken(&identity.email, identity.id) {
            return Err(StoreError::EmailTaken);
        }

        if let Some(current) = state.identities.get_mut(&identity.id) {
            current.name = identity.name.clone();
            current.email = identity.email.clone();
            current.password_hash = identity.password_hash.clone();
            current.is_active = identity.is_active;
        }
        state.audit.push(audit.clone());
        debug!("Updated identity {} in memory store", identity.id);
        Ok(())
    }

    async fn soft_delete_identity(
        &self,
        id: IdentityId,
        deleted_at: DateTime<Utc>,
        audit: &AuditEntry,
    ) -> StoreResult<Identity> {
        let mut state = self.state.write().await;
        let target_is_admin = match state.identities.get(&id) {
            Some(current) if !current.is_deleted() => current.is_admin,
            _ => return Err(StoreError::NotFound),
        };
        if target_is_admin && state.admins_excluding(id) == 0 {
            return Err(StoreError::LastAdmin);
        }

        let deleted = match state.identities.get_mut(&id) {
            Some(current) => {
                current.deleted_at = Some(deleted_at);
                current.clone()
            }
            None => return Err(StoreError::NotFound),
        };
        state.audit.push(audit.clone());
        debug!("Soft-deleted identity {} in memory store", id);
        Ok(deleted)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self) -> StoreResult<Vec<AuditEntry>> {
        let state = self.state.read().await;
        // Reverse first so the stable sort keeps later insertions ahead on ties
        let mut entries: Vec<AuditEntry> = state.audit.iter().rev().cloned().collect();
        entries.sort_by(|a, b| b.performed_at.cmp(&a.performed_at));
        Ok(entries)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
