//! Core data type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! impl_uuid_newtype {
    ($t:ident, $name:literal) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new random (v4) identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = crate::WardenError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s)
                    .map(Self)
                    .map_err(|e| crate::WardenError::invalid_input(format!("{}: {}", $name, e)))
            }
        }
    };
}

impl_uuid_newtype!(IdentityId, "IdentityId");
impl_uuid_newtype!(AuditEntryId, "AuditEntryId");

/// Acting principal recorded for operations performed without a token
/// (self-service registration, bootstrap seeding).
pub const SYSTEM_ACTOR: IdentityId = IdentityId::from_uuid(Uuid::nil());

/// Entity type tag used in audit entries for identities
pub const IDENTITY_ENTITY: &str = "identity";

/// A principal known to the directory.
///
/// Never serialized directly: it carries the password hash. Use
/// [`Identity::view`] to produce the public projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
    /// Lowercased login key
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Public projection without the password hash
    pub fn view(&self) -> IdentityView {
        IdentityView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            is_active: self.is_active,
            is_admin: self.is_admin,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        }
    }
}

/// Public identity information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityView {
    pub id: IdentityId,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for directory-create
#[derive(Clone, Deserialize)]
pub struct NewIdentity {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Accepted for wire compatibility and always ignored
    #[serde(default)]
    pub is_admin: Option<bool>,
}

impl std::fmt::Debug for NewIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewIdentity")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Partial update for directory-update; absent fields are left unchanged.
///
/// There is intentionally no admin flag here.
#[derive(Clone, Default, Deserialize)]
pub struct IdentityPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub password: Option<String>,
}

impl IdentityPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.is_active.is_none()
            && self.password.is_none()
    }

    /// Names of the fields present in this patch (for audit details)
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.email.is_some() {
            fields.push("email");
        }
        if self.is_active.is_some() {
            fields.push("is_active");
        }
        if self.password.is_some() {
            fields.push("password");
        }
        fields
    }
}

impl std::fmt::Debug for IdentityPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityPatch")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("is_active", &self.is_active)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Listing filters: partial case-insensitive match on name and email, exact
/// match on the active flag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityFilter {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

impl IdentityFilter {
    pub fn matches(&self, identity: &Identity) -> bool {
        let contains = |haystack: &str, needle: &Option<String>| match needle {
            Some(needle) => haystack
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            None => true,
        };

        contains(&identity.name, &self.name)
            && contains(&identity.email, &self.email)
            && self.is_active.map_or(true, |active| identity.is_active == active)
    }
}

/// Offset pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub skip: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 100,
        }
    }
}

/// Audit action tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AuditAction::Create),
            "update" => Ok(AuditAction::Update),
            "delete" => Ok(AuditAction::Delete),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

/// Immutable record of a privileged state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub performed_by: IdentityId,
    pub performed_at: DateTime<Utc>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, email: &str, active: bool) -> Identity {
        Identity {
            id: IdentityId::new(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            is_active: active,
            is_admin: false,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_filter_is_case_insensitive_and_partial() {
        let alice = identity("Alice Smith", "alice@inst.example", true);

        let filter = IdentityFilter {
            name: Some("SMI".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&alice));

        let filter = IdentityFilter {
            email: Some("INST".to_string()),
            is_active: Some(false),
            ..Default::default()
        };
        assert!(!filter.matches(&alice));
    }

    #[test]
    fn test_view_omits_password_hash() {
        let alice = identity("Alice", "alice@inst.example", true);
        let json = serde_json::to_value(alice.view()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("deleted_at").is_none());
        assert_eq!(json["email"], "alice@inst.example");
    }

    #[test]
    fn test_patch_debug_redacts_password() {
        let patch = IdentityPatch {
            password: Some("Secret123!".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", patch);
        assert!(!debug.contains("Secret123!"));
        assert_eq!(patch.changed_fields(), vec!["password"]);
    }

    #[test]
    fn test_system_actor_is_nil() {
        assert!(SYSTEM_ACTOR.as_uuid().is_nil());
        assert_eq!("not-a-uuid".parse::<IdentityId>().unwrap_err().kind(), crate::ErrorKind::Validation);
    }
}
