//! Password hashing and verification
//!
//! Argon2id with a random per-hash salt, stored as a PHC string. The hash
//! embeds its own parameters so verification keeps working if the defaults
//! change later.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::LazyLock;
use tracing::{debug, warn};
use warden_core::{WardenError, WardenResult};

/// Hash of a random throwaway password, used to equalize login timing when
/// the email is unknown
static DECOY_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    let decoy: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    hash_password(&decoy).ok()
});

/// Hash password using Argon2
pub fn hash_password(password: &str) -> WardenResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            warn!("Failed to hash password: {}", e);
            WardenError::internal("password hashing failed")
        })
}

/// Verify password against hash.
///
/// A malformed hash is treated as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Stored password hash is malformed: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Burn one verification against a decoy hash. Always returns `false`.
pub fn dummy_verify(password: &str) -> bool {
    if let Some(decoy) = DECOY_HASH.as_deref() {
        let _ = verify_password(password, decoy);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("Password123!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Password123!", &hash));
        assert!(!verify_password("Password123?", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("Password123!").unwrap();
        let second = hash_password("Password123!").unwrap();
        assert_ne!(first, second);
        assert!(verify_password("Password123!", &second));
    }

    #[test]
    fn test_malformed_hash_is_a_mismatch() {
        assert!(!verify_password("Password123!", "not-a-phc-string"));
        assert!(!verify_password("Password123!", ""));
    }

    #[test]
    fn test_dummy_verify_never_matches() {
        assert!(!dummy_verify("Password123!"));
        assert!(!dummy_verify(""));
    }
}
