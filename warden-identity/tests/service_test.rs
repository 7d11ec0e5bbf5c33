//! Boundary operation tests, run against every store backend

use chrono::{Duration, Utc};
use std::sync::Arc;
use warden_auth::{Claims, InputPolicy, TokenService};
use warden_core::{
    AuditAction, ErrorKind, IdentityFilter, IdentityId, IdentityPatch, NewIdentity, Pagination,
    PolicyConfig, WardenError, SYSTEM_ACTOR,
};
use warden_identity::{IdentityStore, MemoryStore, SeedOutcome, WardenService};

const PASSWORD: &str = "Password123!";

fn service_with(store: Arc<dyn IdentityStore>) -> WardenService {
    let input = InputPolicy::from(&PolicyConfig {
        institutional_domain: "inst.example".to_string(),
        bootstrap_email: Some("admin@example.com".to_string()),
    });
    WardenService::from_parts(
        store,
        Arc::new(TokenService::new(b"integration-secret")),
        input,
        Duration::minutes(30),
    )
}

async fn memory_service() -> WardenService {
    service_with(Arc::new(MemoryStore::new()))
}

async fn sqlite_service() -> WardenService {
    let store = warden_identity::SqliteStore::connect("sqlite::memory:")
        .await
        .expect("sqlite store");
    service_with(Arc::new(store))
}

fn new_identity(name: &str, email: &str) -> NewIdentity {
    NewIdentity {
        name: name.to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        is_admin: None,
    }
}

/// Seed an administrator and return claims for it
async fn admin_claims(service: &WardenService, email: &str) -> Claims {
    service
        .seed_admin(new_identity("Admin", email))
        .await
        .expect("seed admin");
    login_claims(service, email).await
}

async fn login_claims(service: &WardenService, email: &str) -> Claims {
    let outcome = service.login(email, PASSWORD).await.expect("login");
    let header = format!("Bearer {}", outcome.token);
    service
        .validate_bearer(Some(&header))
        .expect("fresh token validates")
}

fn code(err: WardenError) -> &'static str {
    err.code()
}

macro_rules! backend_tests {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(super::memory_service().await).await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(super::sqlite_service().await).await;
                }
            )*
        }
    };
}

backend_tests!(
    create_then_duplicate_email,
    weak_password_persists_nothing,
    wrong_password_is_uniform,
    non_admin_updates,
    delete_admins_and_last_admin,
    delete_twice_is_not_found,
    audit_log_is_admin_only_and_newest_first,
    soft_deleted_email_can_be_reused,
    list_filters_and_pagination,
    including_deleted_requires_admin,
    session_info_reports_subject,
    inactive_identity_cannot_login,
    accented_names_match_case_insensitively,
);

async fn create_then_duplicate_email(service: WardenService) {
    let created = service
        .create_identity(new_identity("A", "a@inst.example"))
        .await
        .unwrap();
    assert!(!created.is_admin);
    assert_eq!(created.email, "a@inst.example");

    let err = service
        .create_identity(new_identity("A again", "a@inst.example"))
        .await
        .unwrap_err();
    assert_eq!(code(err), "duplicate_email");

    // Case does not make a different login key
    let err = service
        .create_identity(new_identity("A upper", "A@INST.EXAMPLE"))
        .await
        .unwrap_err();
    assert_eq!(code(err), "duplicate_email");
}

async fn weak_password_persists_nothing(service: WardenService) {
    let admin = admin_claims(&service, "root@inst.example").await;
    let before = service.list_audit_log(Some(&admin)).await.unwrap().len();

    let mut data = new_identity("A", "a@inst.example");
    data.password = "weak".to_string();
    let err = service.create_identity(data).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(code(err), "weak_password");

    let err = service
        .create_identity(new_identity("B", "b@gmail.com"))
        .await
        .unwrap_err();
    assert_eq!(code(err), "non_institutional_email");

    let listed = service
        .list_identities(Some(&admin), &IdentityFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(service.list_audit_log(Some(&admin)).await.unwrap().len(), before);
}

async fn wrong_password_is_uniform(service: WardenService) {
    service
        .create_identity(new_identity("A", "a@inst.example"))
        .await
        .unwrap();

    let first = service.login("a@inst.example", "Wrong123!").await.unwrap_err();
    let second = service.login("a@inst.example", "Wrong123!").await.unwrap_err();
    let unknown = service.login("nobody@inst.example", PASSWORD).await.unwrap_err();

    assert_eq!(code(first), "invalid_credentials");
    assert_eq!(second.to_string(), unknown.to_string());
    assert_eq!(second.code(), unknown.code());

    let ok = service.login("A@Inst.Example", PASSWORD).await.unwrap();
    assert!(!ok.is_admin);
    assert!(ok.expires_at > Utc::now());
}

async fn non_admin_updates(service: WardenService) {
    let a = service
        .create_identity(new_identity("A", "a@inst.example"))
        .await
        .unwrap();
    let b = service
        .create_identity(new_identity("B", "b@inst.example"))
        .await
        .unwrap();
    let a_claims = login_claims(&service, "a@inst.example").await;

    let patch = IdentityPatch {
        name: Some("Hijacked".to_string()),
        ..Default::default()
    };
    let err = service
        .update_identity(Some(&a_claims), b.id, patch)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let patch = IdentityPatch {
        name: Some("A Renamed".to_string()),
        ..Default::default()
    };
    let updated = service
        .update_identity(Some(&a_claims), a.id, patch)
        .await
        .unwrap();
    assert_eq!(updated.name, "A Renamed");
    assert!(!updated.is_admin);

    // Missing target is reported before permission
    let err = service
        .update_identity(Some(&a_claims), IdentityId::new(), IdentityPatch::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let admin = admin_claims(&service, "root@inst.example").await;
    let audit = service.list_audit_log(Some(&admin)).await.unwrap();
    let update = audit
        .iter()
        .find(|entry| entry.action == AuditAction::Update)
        .expect("update entry");
    assert_eq!(update.performed_by, a.id);
    assert_eq!(update.entity_id, *a.id.as_uuid());
}

async fn delete_admins_and_last_admin(service: WardenService) {
    let root = admin_claims(&service, "root@inst.example").await;

    let err = service.delete_identity(Some(&root), root.sub).await.unwrap_err();
    assert_eq!(code(err), "last_admin");

    let second = admin_claims(&service, "second@inst.example").await;
    let admins_before = service
        .directory()
        .count_admins_excluding(IdentityId::from_uuid(uuid::Uuid::nil()))
        .await
        .unwrap();
    assert_eq!(admins_before, 2);

    let deleted = service.delete_identity(Some(&root), second.sub).await.unwrap();
    assert!(deleted.is_deleted());

    let admins_after = service
        .directory()
        .count_admins_excluding(IdentityId::from_uuid(uuid::Uuid::nil()))
        .await
        .unwrap();
    assert_eq!(admins_after, 1);

    let err = service.delete_identity(Some(&root), root.sub).await.unwrap_err();
    assert_eq!(code(err), "last_admin");

    // Non-admins cannot delete at all
    let user = service
        .create_identity(new_identity("U", "u@inst.example"))
        .await
        .unwrap();
    let user_claims = login_claims(&service, "u@inst.example").await;
    let err = service
        .delete_identity(Some(&user_claims), user.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

async fn delete_twice_is_not_found(service: WardenService) {
    let root = admin_claims(&service, "root@inst.example").await;
    let user = service
        .create_identity(new_identity("U", "u@inst.example"))
        .await
        .unwrap();

    service.delete_identity(Some(&root), user.id).await.unwrap();
    let entries_after_first = service.list_audit_log(Some(&root)).await.unwrap().len();

    let err = service.delete_identity(Some(&root), user.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(
        service.list_audit_log(Some(&root)).await.unwrap().len(),
        entries_after_first
    );

    let err = service.get_identity(Some(&root), user.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

async fn audit_log_is_admin_only_and_newest_first(service: WardenService) {
    let root = admin_claims(&service, "root@inst.example").await;
    let user = service
        .create_identity(new_identity("U", "u@inst.example"))
        .await
        .unwrap();
    let user_claims = login_claims(&service, "u@inst.example").await;

    let err = service.list_audit_log(Some(&user_claims)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let err = service.list_audit_log(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    service.delete_identity(Some(&root), user.id).await.unwrap();

    let entries = service.list_audit_log(Some(&root)).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].action, AuditAction::Delete);
    assert_eq!(entries[0].entity_id, *user.id.as_uuid());
    assert_eq!(entries[0].performed_by, root.sub);
    assert_eq!(
        entries[0].details,
        Some(serde_json::json!({ "email": "u@inst.example" }))
    );
    assert_eq!(entries[2].performed_by, SYSTEM_ACTOR);
    assert!(entries
        .windows(2)
        .all(|pair| pair[0].performed_at >= pair[1].performed_at));
}

async fn soft_deleted_email_can_be_reused(service: WardenService) {
    let root = admin_claims(&service, "root@inst.example").await;
    let first = service
        .create_identity(new_identity("U", "u@inst.example"))
        .await
        .unwrap();
    service.delete_identity(Some(&root), first.id).await.unwrap();

    let second = service
        .create_identity(new_identity("U2", "u@inst.example"))
        .await
        .unwrap();
    assert_ne!(first.id, second.id);

    let claims = login_claims(&service, "u@inst.example").await;
    assert_eq!(claims.sub, second.id);
}

async fn list_filters_and_pagination(service: WardenService) {
    let root = admin_claims(&service, "root@inst.example").await;
    for (name, email) in [
        ("Alice Smith", "alice@inst.example"),
        ("Bob Smith", "bob@inst.example"),
        ("Carol Jones", "carol@inst.example"),
    ] {
        service
            .create_identity(new_identity(name, email))
            .await
            .unwrap();
    }
    let carol = service
        .list_identities(
            Some(&root),
            &IdentityFilter {
                email: Some("CAROL".to_string()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(carol.len(), 1);

    service
        .update_identity(
            Some(&root),
            carol[0].id,
            IdentityPatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let smiths = service
        .list_identities(
            Some(&root),
            &IdentityFilter {
                name: Some("smith".to_string()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(smiths.len(), 2);

    let inactive = service
        .list_identities(
            Some(&root),
            &IdentityFilter {
                is_active: Some(false),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].email, "carol@inst.example");

    let all = service
        .list_identities(Some(&root), &IdentityFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 4);

    let page = service
        .list_identities(
            Some(&root),
            &IdentityFilter::default(),
            Pagination { skip: 1, limit: 2 },
        )
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, all[1].id);
    assert_eq!(page[1].id, all[2].id);

    let err = service
        .list_identities(None, &IdentityFilter::default(), Pagination::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
}

async fn including_deleted_requires_admin(service: WardenService) {
    let root = admin_claims(&service, "root@inst.example").await;
    let user = service
        .create_identity(new_identity("U", "u@inst.example"))
        .await
        .unwrap();
    let other = service
        .create_identity(new_identity("O", "o@inst.example"))
        .await
        .unwrap();
    let other_claims = login_claims(&service, "o@inst.example").await;

    service.delete_identity(Some(&root), user.id).await.unwrap();

    let seen = service
        .get_identity_including_deleted(Some(&root), user.id)
        .await
        .unwrap();
    assert!(seen.deleted_at.is_some());

    let err = service
        .get_identity_including_deleted(Some(&other_claims), user.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = service
        .get_identity_including_deleted(Some(&root), IdentityId::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert!(service.get_identity(Some(&other_claims), other.id).await.is_ok());
}

async fn session_info_reports_subject(service: WardenService) {
    let root = admin_claims(&service, "root@inst.example").await;
    let info = service.session_info(Some(&root)).await.unwrap();
    assert_eq!(info.user_id, root.sub);
    assert_eq!(info.email, "root@inst.example");
    assert!(info.is_admin);
    assert_eq!(Some(info.expires_at), root.expires_at());

    let user = service
        .create_identity(new_identity("U", "u@inst.example"))
        .await
        .unwrap();
    let user_claims = login_claims(&service, "u@inst.example").await;
    service.delete_identity(Some(&root), user.id).await.unwrap();

    // Token outlives its subject
    let err = service.session_info(Some(&user_claims)).await.unwrap_err();
    assert_eq!(code(err), "invalid_token");
}

async fn inactive_identity_cannot_login(service: WardenService) {
    let root = admin_claims(&service, "root@inst.example").await;
    let user = service
        .create_identity(new_identity("U", "u@inst.example"))
        .await
        .unwrap();

    service
        .update_identity(
            Some(&root),
            user.id,
            IdentityPatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = service.login("u@inst.example", PASSWORD).await.unwrap_err();
    assert_eq!(code(err), "invalid_credentials");
}

async fn accented_names_match_case_insensitively(service: WardenService) {
    let root = admin_claims(&service, "root@inst.example").await;
    service
        .create_identity(new_identity("ÁLVARO Núñez", "alvaro@inst.example"))
        .await
        .unwrap();
    service
        .create_identity(new_identity("Alvaro Nunez", "plain@inst.example"))
        .await
        .unwrap();

    let accented = service
        .list_identities(
            Some(&root),
            &IdentityFilter {
                name: Some("álvaro núñ".to_string()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(accented.len(), 1);
    assert_eq!(accented[0].email, "alvaro@inst.example");

    let plain = service
        .list_identities(
            Some(&root),
            &IdentityFilter {
                name: Some("ALVARO".to_string()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(plain.len(), 1);
    assert_eq!(plain[0].email, "plain@inst.example");
}

#[tokio::test]
async fn failed_audit_write_leaves_identity_unchanged() {
    let store = warden_identity::SqliteStore::connect("sqlite::memory:")
        .await
        .unwrap();
    let pool = store.pool().clone();
    let service = service_with(Arc::new(store));

    let root = admin_claims(&service, "root@inst.example").await;
    let user = service
        .create_identity(new_identity("User", "user@inst.example"))
        .await
        .unwrap();

    // Only creations may still be audited
    sqlx::query(
        r#"
        CREATE TRIGGER reject_audit BEFORE INSERT ON audit_log
        WHEN NEW.action != 'create'
        BEGIN
            SELECT RAISE(ABORT, 'audit log unavailable');
        END
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let err = service
        .update_identity(
            Some(&root),
            user.id,
            IdentityPatch {
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    let err = service
        .delete_identity(Some(&root), user.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    let current = service.get_identity(Some(&root), user.id).await.unwrap();
    assert_eq!(current, user);

    let audit = service.list_audit_log(Some(&root)).await.unwrap();
    assert!(audit.iter().all(|entry| entry.action == AuditAction::Create));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let service = memory_service().await;
    let outcome = service
        .seed_admin(new_identity("Admin", "root@inst.example"))
        .await
        .unwrap();
    assert!(matches!(outcome, SeedOutcome::Created(_)));

    let issued = service
        .tokens()
        .issue(
            outcome.identity().id,
            true,
            Duration::minutes(30),
            Utc::now() - Duration::hours(1),
        )
        .unwrap();
    let header = format!("Bearer {}", issued.token);
    let err = service.validate_bearer(Some(&header)).unwrap_err();
    assert_eq!(code(err), "invalid_token");

    let err = service.validate_bearer(Some(&issued.token)).unwrap_err();
    assert_eq!(code(err), "missing_auth_header");
}

#[tokio::test]
async fn bootstrap_email_outside_domain_is_accepted() {
    let service = memory_service().await;
    let created = service
        .create_identity(new_identity("Bootstrap", "admin@example.com"))
        .await
        .unwrap();
    assert!(!created.is_admin);
}
