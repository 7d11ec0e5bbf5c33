//! HTTP handlers
//!
//! Each handler only translates between HTTP and one boundary operation.

use crate::{
    error::ApiResult,
    extract::{ApiJson, ApiPath, ApiQuery, Bearer},
    AppState,
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{
    AuditEntry, IdentityFilter, IdentityId, IdentityPatch, IdentityView, NewIdentity, Pagination,
};
use warden_identity::SessionInfo;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state
        .store()
        .health_check()
        .await
        .map_err(warden_core::WardenError::from)?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user_id: IdentityId,
    pub email: String,
    pub is_admin: bool,
    pub expires_at: DateTime<Utc>,
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state.service.login(&request.email, &request.password).await?;

    Ok(Json(LoginResponse {
        access_token: outcome.token,
        token_type: "bearer".to_string(),
        user_id: outcome.subject_id,
        email: outcome.email,
        is_admin: outcome.is_admin,
        expires_at: outcome.expires_at,
    }))
}

pub async fn session(
    State(state): State<AppState>,
    Bearer(claims): Bearer,
) -> ApiResult<Json<SessionInfo>> {
    Ok(Json(state.service.session_info(Some(&claims)).await?))
}

/// Self-service registration
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<NewIdentity>,
) -> ApiResult<(StatusCode, Json<IdentityView>)> {
    let identity = state.service.create_identity(data).await?;
    Ok((StatusCode::CREATED, Json(identity.view())))
}

/// Query string for user listing
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    #[serde(alias = "full_name")]
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

impl ListUsersQuery {
    fn split(self) -> (IdentityFilter, Pagination) {
        let defaults = Pagination::default();
        (
            IdentityFilter {
                name: self.name,
                email: self.email,
                is_active: self.is_active,
            },
            Pagination {
                skip: self.skip.unwrap_or(defaults.skip),
                limit: self.limit.unwrap_or(defaults.limit),
            },
        )
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    Bearer(claims): Bearer,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> ApiResult<Json<Vec<IdentityView>>> {
    let (filter, page) = query.split();
    let identities = state
        .service
        .list_identities(Some(&claims), &filter, page)
        .await?;
    Ok(Json(identities.iter().map(|identity| identity.view()).collect()))
}

#[derive(Debug, Default, Deserialize)]
pub struct GetUserQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

pub async fn get_user(
    State(state): State<AppState>,
    Bearer(claims): Bearer,
    ApiPath(id): ApiPath<IdentityId>,
    ApiQuery(query): ApiQuery<GetUserQuery>,
) -> ApiResult<Json<IdentityView>> {
    let identity = if query.include_deleted {
        state
            .service
            .get_identity_including_deleted(Some(&claims), id)
            .await?
    } else {
        state.service.get_identity(Some(&claims), id).await?
    };
    Ok(Json(identity.view()))
}

pub async fn update_user(
    State(state): State<AppState>,
    Bearer(claims): Bearer,
    ApiPath(id): ApiPath<IdentityId>,
    ApiJson(patch): ApiJson<IdentityPatch>,
) -> ApiResult<Json<IdentityView>> {
    let identity = state
        .service
        .update_identity(Some(&claims), id, patch)
        .await?;
    Ok(Json(identity.view()))
}

/// Soft delete
pub async fn delete_user(
    State(state): State<AppState>,
    Bearer(claims): Bearer,
    ApiPath(id): ApiPath<IdentityId>,
) -> ApiResult<Json<IdentityView>> {
    let identity = state.service.delete_identity(Some(&claims), id).await?;
    Ok(Json(identity.view()))
}

pub async fn list_audit(
    State(state): State<AppState>,
    Bearer(claims): Bearer,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    Ok(Json(state.service.list_audit_log(Some(&claims)).await?))
}
