//! Request extractors
//!
//! Wrappers around axum's extractors that reject with [`ApiError`], so
//! malformed bodies, paths and query strings get the same JSON error body as
//! every other failure.

use crate::{error::ApiError, AppState};
use axum::{
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use warden_auth::Claims;
use warden_core::{AuthFailure, WardenError};

/// Claims of a request carrying a valid `Authorization: Bearer` token.
///
/// Rejects with 401 `missing_auth_header` or `invalid_token`.
#[derive(Debug, Clone)]
pub struct Bearer(pub Claims);

impl FromRequestParts<AppState> for Bearer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(axum::http::header::AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| {
                WardenError::unauthenticated(AuthFailure::MissingOrMalformedHeader)
            })?),
            None => None,
        };

        let claims = state.service.validate_bearer(header)?;
        Ok(Bearer(claims))
    }
}

/// JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
