//! Append-only audit trail

use crate::store::IdentityStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use warden_core::{AuditAction, AuditEntry, AuditEntryId, IdentityId, WardenResult};

/// Records privileged state changes. Entries are never updated or removed.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn IdentityStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Build an entry stamped with the server clock, for committing alongside
    /// the mutation it describes
    pub fn entry(
        action: AuditAction,
        entity_type: &str,
        entity_id: Uuid,
        performed_by: IdentityId,
        details: Option<serde_json::Value>,
    ) -> AuditEntry {
        AuditEntry {
            id: AuditEntryId::new(),
            action,
            entity_type: entity_type.to_string(),
            entity_id,
            performed_by,
            performed_at: Utc::now(),
            details,
        }
    }

    /// Append a standalone entry
    pub async fn append(
        &self,
        action: AuditAction,
        entity_type: &str,
        entity_id: Uuid,
        performed_by: IdentityId,
        details: Option<serde_json::Value>,
    ) -> WardenResult<AuditEntry> {
        let entry = Self::entry(action, entity_type, entity_id, performed_by, details);
        self.store.append_audit(&entry).await?;

        info!(
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            performed_by = %entry.performed_by,
            "Audit entry recorded"
        );
        Ok(entry)
    }

    /// Every entry, newest first
    pub async fn list_all(&self) -> WardenResult<Vec<AuditEntry>> {
        Ok(self.store.list_audit().await?)
    }
}
