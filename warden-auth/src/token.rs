//! Signed, time-bound session tokens (HS256 JWT)
//!
//! The service holds the process-wide signing secret. Time is always passed in
//! explicitly; callers at the boundary supply `Utc::now()`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use warden_core::{AuthFailure, IdentityId, WardenError, WardenResult};

/// Session claims carried inside a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (identity id)
    pub sub: IdentityId,
    /// Admin flag at issuance time
    pub is_admin: bool,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds, exclusive)
    pub exp: i64,
    /// Unique token id
    pub jti: Uuid,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// A token is expired at or after its expiration instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }
}

/// Opaque token rejection. Bad signature, wrong shape and expiry are not
/// distinguished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid token")]
pub struct InvalidToken;

impl From<InvalidToken> for WardenError {
    fn from(_: InvalidToken) -> Self {
        WardenError::unauthenticated(AuthFailure::InvalidToken)
    }
}

/// A freshly signed token together with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Issues and validates session tokens
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller-supplied clock instead
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign a token for `subject` that expires `ttl` after `now`
    pub fn issue(
        &self,
        subject: IdentityId,
        is_admin: bool,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> WardenResult<IssuedToken> {
        if ttl <= Duration::zero() {
            return Err(WardenError::invalid_input("token ttl must be positive"));
        }

        // `exp` has whole-second resolution; round up so the token never
        // expires before `now + ttl`
        let deadline = now + ttl;
        let exp = if deadline.timestamp_subsec_nanos() > 0 {
            deadline.timestamp() + 1
        } else {
            deadline.timestamp()
        };

        let claims = Claims {
            sub: subject,
            is_admin,
            iat: now.timestamp(),
            exp,
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            WardenError::internal(format!("Failed to sign token: {}", e))
        })?;

        debug!(subject = %subject, jti = %claims.jti, "Issued session token");
        Ok(IssuedToken { token, claims })
    }

    /// Verify signature and shape, then require `now` to precede expiry
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, InvalidToken> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            InvalidToken
        })?;

        if data.claims.is_expired_at(now) {
            debug!(subject = %data.claims.sub, "Token rejected: expired");
            return Err(InvalidToken);
        }

        Ok(data.claims)
    }

    /// Parse an `Authorization` header value and validate the bearer token
    pub fn validate_bearer(
        &self,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> WardenResult<Claims> {
        let token = parse_bearer(header).map_err(WardenError::unauthenticated)?;
        Ok(self.validate(token, now)?)
    }
}

/// Extract the token from a `Bearer <token>` header value
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthFailure> {
    let header = header.ok_or(AuthFailure::MissingOrMalformedHeader)?;
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthFailure::MissingOrMalformedHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthFailure::MissingOrMalformedHeader);
    }

    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return Err(AuthFailure::MissingOrMalformedHeader);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service() -> TokenService {
        TokenService::new(b"test-secret")
    }

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_token_valid_until_expiry_boundary() {
        let svc = service();
        let now = epoch();
        let issued = svc
            .issue(IdentityId::new(), false, Duration::minutes(30), now)
            .unwrap();

        assert!(svc.validate(&issued.token, now).is_ok());
        assert!(svc
            .validate(&issued.token, now + Duration::minutes(30) - Duration::milliseconds(1))
            .is_ok());
        // Boundary instant is already expired
        assert_eq!(
            svc.validate(&issued.token, now + Duration::minutes(30)),
            Err(InvalidToken)
        );
        assert_eq!(
            svc.validate(&issued.token, now + Duration::hours(2)),
            Err(InvalidToken)
        );
    }

    #[test]
    fn test_sub_second_issue_rounds_expiry_up() {
        let svc = service();
        let now = epoch() + Duration::milliseconds(700);

        let short = svc
            .issue(IdentityId::new(), false, Duration::milliseconds(200), now)
            .unwrap();
        assert_eq!(short.claims.expires_at(), Some(epoch() + Duration::seconds(1)));
        assert!(svc.validate(&short.token, now).is_ok());
        assert!(svc
            .validate(&short.token, now + Duration::milliseconds(200))
            .is_ok());
        assert_eq!(
            svc.validate(&short.token, epoch() + Duration::seconds(1)),
            Err(InvalidToken)
        );

        let long = svc
            .issue(IdentityId::new(), false, Duration::minutes(30), now)
            .unwrap();
        assert!(svc
            .validate(&long.token, now + Duration::minutes(30) - Duration::milliseconds(100))
            .is_ok());
        assert!(svc
            .validate(&long.token, now + Duration::minutes(30))
            .is_ok());
    }

    #[test]
    fn test_claims_round_trip() {
        let svc = service();
        let subject = IdentityId::new();
        let issued = svc.issue(subject, true, Duration::minutes(5), epoch()).unwrap();

        let claims = svc.validate(&issued.token, epoch()).unwrap();
        assert_eq!(claims, issued.claims);
        assert_eq!(claims.sub, subject);
        assert!(claims.is_admin);
        assert_eq!(claims.expires_at(), Some(epoch() + Duration::minutes(5)));
    }

    #[test]
    fn test_same_second_tokens_differ() {
        let svc = service();
        let subject = IdentityId::new();
        let a = svc.issue(subject, false, Duration::minutes(5), epoch()).unwrap();
        let b = svc.issue(subject, false, Duration::minutes(5), epoch()).unwrap();
        assert_ne!(a.token, b.token);
        assert_ne!(a.claims.jti, b.claims.jti);
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let svc = service();
        let err = svc
            .issue(IdentityId::new(), false, Duration::zero(), epoch())
            .unwrap_err();
        assert_eq!(err.kind(), warden_core::ErrorKind::Validation);
        assert!(svc
            .issue(IdentityId::new(), false, Duration::minutes(-1), epoch())
            .is_err());
    }

    #[test]
    fn test_wrong_secret_and_garbage_rejected() {
        let issued = service()
            .issue(IdentityId::new(), false, Duration::minutes(5), epoch())
            .unwrap();

        let other = TokenService::new(b"another-secret");
        assert_eq!(other.validate(&issued.token, epoch()), Err(InvalidToken));
        assert_eq!(service().validate("not.a.jwt", epoch()), Err(InvalidToken));
        assert_eq!(service().validate("", epoch()), Err(InvalidToken));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let svc = service();
        let issued = svc
            .issue(IdentityId::new(), false, Duration::minutes(5), epoch())
            .unwrap();
        let admin = svc
            .issue(IdentityId::new(), true, Duration::minutes(5), epoch())
            .unwrap();

        // Splice the admin payload onto the non-admin signature
        let parts: Vec<&str> = issued.token.split('.').collect();
        let admin_parts: Vec<&str> = admin.token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], admin_parts[1], parts[2]);
        assert_eq!(svc.validate(&forged, epoch()), Err(InvalidToken));
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer(Some("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
        assert_eq!(parse_bearer(Some("bearer abc")), Ok("abc"));
        assert_eq!(
            parse_bearer(None),
            Err(AuthFailure::MissingOrMalformedHeader)
        );
        assert_eq!(
            parse_bearer(Some("Basic dXNlcjpwdw==")),
            Err(AuthFailure::MissingOrMalformedHeader)
        );
        assert_eq!(
            parse_bearer(Some("Bearer ")),
            Err(AuthFailure::MissingOrMalformedHeader)
        );
        assert_eq!(
            parse_bearer(Some("abc.def.ghi")),
            Err(AuthFailure::MissingOrMalformedHeader)
        );
    }

    #[test]
    fn test_validate_bearer_maps_failures() {
        let svc = service();
        let err = svc.validate_bearer(None, epoch()).unwrap_err();
        assert_eq!(err.code(), "missing_auth_header");

        let err = svc.validate_bearer(Some("Bearer nope"), epoch()).unwrap_err();
        assert_eq!(err.code(), "invalid_token");

        let issued = svc
            .issue(IdentityId::new(), false, Duration::minutes(5), epoch())
            .unwrap();
        let header = format!("Bearer {}", issued.token);
        assert!(svc.validate_bearer(Some(&header), epoch()).is_ok());
    }
}
