//! SQLite-backed identity store

use crate::store::{IdentityStore, StoreError, StoreResult, Visibility};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;
use warden_core::{AuditAction, AuditEntry, Identity, IdentityFilter, IdentityId, Pagination};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS identities (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        name_folded TEXT NOT NULL,
        email_folded TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TEXT NOT NULL,
        deleted_at TEXT
    )
    "#,
    // Email is unique among non-deleted rows only
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_identities_visible_email
        ON identities(email_folded) WHERE deleted_at IS NULL
    "#,
    "CREATE INDEX IF NOT EXISTS idx_identities_created ON identities(created_at, id)",
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        action TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        performed_by TEXT NOT NULL,
        performed_at TEXT NOT NULL,
        details TEXT
    )
    "#,
];

const IDENTITY_COLUMNS: &str =
    "id, name, email, password_hash, is_active, is_admin, created_at, deleted_at";

/// Case folding for the `*_folded` columns. SQLite's `lower()` only folds
/// ASCII, so matching happens on values folded here.
fn fold(value: &str) -> String {
    value.to_lowercase()
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::unavailable(format!("Corrupt timestamp '{}'", raw), e))
}

fn decode_uuid(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::unavailable(format!("Corrupt id '{}'", raw), e))
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if e.as_database_error().is_some_and(|db| {
            db.is_unique_violation() && db.message().contains("identities.email_folded")
        }) {
            return StoreError::EmailTaken;
        }
        error!("{}: {}", context, e);
        StoreError::unavailable(context, e)
    }
}

fn row_to_identity(row: &SqliteRow) -> StoreResult<Identity> {
    let decode = |e: sqlx::Error| StoreError::unavailable("Failed to decode identity row", e);

    let id: String = row.try_get("id").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let deleted_at: Option<String> = row.try_get("deleted_at").map_err(decode)?;

    Ok(Identity {
        id: IdentityId::from_uuid(decode_uuid(&id)?),
        name: row.try_get("name").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        is_active: row.try_get("is_active").map_err(decode)?,
        is_admin: row.try_get("is_admin").map_err(decode)?,
        created_at: decode_ts(&created_at)?,
        deleted_at: deleted_at.as_deref().map(decode_ts).transpose()?,
    })
}

fn row_to_audit(row: &SqliteRow) -> StoreResult<AuditEntry> {
    let decode = |e: sqlx::Error| StoreError::unavailable("Failed to decode audit row", e);

    let id: String = row.try_get("id").map_err(decode)?;
    let action: String = row.try_get("action").map_err(decode)?;
    let entity_id: String = row.try_get("entity_id").map_err(decode)?;
    let performed_by: String = row.try_get("performed_by").map_err(decode)?;
    let performed_at: String = row.try_get("performed_at").map_err(decode)?;
    let details: Option<String> = row.try_get("details").map_err(decode)?;

    let action = AuditAction::from_str(&action).map_err(|message| StoreError::Unavailable {
        message,
        source: None,
    })?;
    let details = details
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| StoreError::unavailable("Corrupt audit details", e))?;

    Ok(AuditEntry {
        id: decode_uuid(&id)?.into(),
        action,
        entity_type: row.try_get("entity_type").map_err(decode)?,
        entity_id: decode_uuid(&entity_id)?,
        performed_by: decode_uuid(&performed_by)?.into(),
        performed_at: decode_ts(&performed_at)?,
        details,
    })
}

async fn insert_audit(conn: &mut SqliteConnection, entry: &AuditEntry) -> StoreResult<()> {
    let details = entry.details.as_ref().map(|value| value.to_string());

    sqlx::query(
        r#"
        INSERT INTO audit_log (id, action, entity_type, entity_id, performed_by, performed_at, details)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.action.as_str())
    .bind(&entry.entity_type)
    .bind(entry.entity_id.to_string())
    .bind(entry.performed_by.to_string())
    .bind(encode_ts(&entry.performed_at))
    .bind(details)
    .execute(conn)
    .await
    .map_err(db_error("Failed to append audit entry"))?;

    Ok(())
}

async fn email_taken(
    conn: &mut SqliteConnection,
    email: &str,
    except: IdentityId,
) -> StoreResult<bool> {
    let row = sqlx::query(
        "SELECT 1 FROM identities WHERE email_folded = ? AND id != ? AND deleted_at IS NULL",
    )
    .bind(fold(email))
    .bind(except.to_string())
    .fetch_optional(conn)
    .await
    .map_err(db_error("Failed to check email uniqueness"))?;

    Ok(row.is_some())
}

async fn count_other_admins(conn: &mut SqliteConnection, id: IdentityId) -> StoreResult<u64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM identities WHERE is_admin AND deleted_at IS NULL AND id != ?",
    )
    .bind(id.to_string())
    .fetch_one(conn)
    .await
    .map_err(db_error("Failed to count administrators"))?;

    let count: i64 = row
        .try_get("count")
        .map_err(|e| StoreError::unavailable("Failed to decode admin count", e))?;
    Ok(count.max(0) as u64)
}

/// Identity store persisted in SQLite
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool, creating tables if needed
    pub async fn new(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    /// Open (creating if missing) the database at `url`
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::unavailable(format!("Invalid database url '{}'", url), e))?
            .create_if_missing(true);

        // Every connection to an in-memory database is a separate database
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(db_error("Failed to open database"))?;

        info!("Connected to SQLite database at {}", url);
        Self::new(pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_tables(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_error("Failed to create schema"))?;
        }
        debug!("Identity schema ready");
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn find_by_id(
        &self,
        id: IdentityId,
        visibility: Visibility,
    ) -> StoreResult<Option<Identity>> {
        let query = match visibility {
            Visibility::Visible => format!(
                "SELECT {} FROM identities WHERE id = ? AND deleted_at IS NULL",
                IDENTITY_COLUMNS
            ),
            Visibility::IncludingDeleted => {
                format!("SELECT {} FROM identities WHERE id = ?", IDENTITY_COLUMNS)
            }
        };

        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to query identity by id"))?;

        row.as_ref().map(row_to_identity).transpose()
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let query = format!(
            "SELECT {} FROM identities WHERE email_folded = ? AND deleted_at IS NULL",
            IDENTITY_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(fold(email))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to query identity by email"))?;

        row.as_ref().map(row_to_identity).transpose()
    }

    async fn list(&self, filter: &IdentityFilter, page: Pagination) -> StoreResult<Vec<Identity>> {
        let query = format!(
            r#"
            SELECT {} FROM identities
            WHERE deleted_at IS NULL
              AND (?1 IS NULL OR instr(name_folded, ?1) > 0)
              AND (?2 IS NULL OR instr(email_folded, ?2) > 0)
              AND (?3 IS NULL OR is_active = ?3)
            ORDER BY created_at, id
            LIMIT ?4 OFFSET ?5
            "#,
            IDENTITY_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(filter.name.as_deref().map(fold))
            .bind(filter.email.as_deref().map(fold))
            .bind(filter.is_active)
            .bind(i64::from(page.limit))
            .bind(i64::from(page.skip))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list identities"))?;

        let identities = rows.iter().map(row_to_identity).collect::<StoreResult<Vec<_>>>()?;
        debug!("Listed {} identities from SQLite store", identities.len());
        Ok(identities)
    }

    async fn count_admins_excluding(&self, id: IdentityId) -> StoreResult<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("Failed to acquire connection"))?;
        count_other_admins(&mut *conn, id).await
    }

    async fn insert_identity(&self, identity: &Identity, audit: &AuditEntry) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        if email_taken(&mut *tx, &identity.email, identity.id).await? {
            return Err(StoreError::EmailTaken);
        }

        sqlx::query(
            r#"
            INSERT INTO identities
                (id, name, email, name_folded, email_folded, password_hash, is_active, is_admin, created_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(identity.id.to_string())
        .bind(&identity.name)
        .bind(&identity.email)
        .bind(fold(&identity.name))
        .bind(fold(&identity.email))
        .bind(&identity.password_hash)
        .bind(identity.is_active)
        .bind(identity.is_admin)
        .bind(encode_ts(&identity.created_at))
        .bind(identity.deleted_at.as_ref().map(encode_ts))
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert identity"))?;

        insert_audit(&mut *tx, audit).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit identity insert"))?;

        debug!("Inserted identity {} into SQLite store", identity.id);
        Ok(())
    }

    async fn update_identity(&self, identity: &Identity, audit: &AuditEntry) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        if email_taken(&mut *tx, &identity.email, identity.id).await? {
            return Err(StoreError::EmailTaken);
        }

        let result = sqlx::query(
            r#"
            UPDATE identities
            SET name = ?, email = ?, name_folded = ?, email_folded = ?, password_hash = ?, is_active = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&identity.name)
        .bind(&identity.email)
        .bind(fold(&identity.name))
        .bind(fold(&identity.email))
        .bind(&identity.password_hash)
        .bind(identity.is_active)
        .bind(identity.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to update identity"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        insert_audit(&mut *tx, audit).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit identity update"))?;

        debug!("Updated identity {} in SQLite store", identity.id);
        Ok(())
    }

    async fn soft_delete_identity(
        &self,
        id: IdentityId,
        deleted_at: DateTime<Utc>,
        audit: &AuditEntry,
    ) -> StoreResult<Identity> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let query = format!(
            "SELECT {} FROM identities WHERE id = ? AND deleted_at IS NULL",
            IDENTITY_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to load identity for delete"))?;

        let mut identity = match row {
            Some(row) => row_to_identity(&row)?,
            None => return Err(StoreError::NotFound),
        };

        if identity.is_admin && count_other_admins(&mut *tx, id).await? == 0 {
            return Err(StoreError::LastAdmin);
        }

        sqlx::query("UPDATE identities SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(encode_ts(&deleted_at))
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to soft-delete identity"))?;

        insert_audit(&mut *tx, audit).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit identity delete"))?;

        identity.deleted_at = Some(deleted_at);
        debug!("Soft-deleted identity {} in SQLite store", id);
        Ok(identity)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("Failed to acquire connection"))?;
        insert_audit(&mut *conn, entry).await
    }

    async fn list_audit(&self) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, action, entity_type, entity_id, performed_by, performed_at, details
            FROM audit_log
            ORDER BY performed_at DESC, seq DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list audit entries"))?;

        rows.iter().map(row_to_audit).collect()
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("Health check failed"))?;
        Ok(())
    }
}
