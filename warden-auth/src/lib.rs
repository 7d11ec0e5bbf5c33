//! Warden Auth - credentials, session tokens and authorization policy
//!
//! Everything in this crate is storage- and transport-agnostic:
//!
//! - [`credentials`]: Argon2 password hashing and verification
//! - [`token`]: HS256 session tokens carrying subject, admin flag and expiry
//! - [`validation`]: password strength and institutional email policies
//! - [`policy`]: the allow/deny decision for each core action

pub mod credentials;
pub mod policy;
pub mod token;
pub mod validation;

pub use credentials::{dummy_verify, hash_password, verify_password};
pub use policy::{authorize, Action, PolicyError};
pub use token::{parse_bearer, Claims, InvalidToken, IssuedToken, TokenService};
pub use validation::{EmailPolicy, InputPolicy, PasswordPolicy, PASSWORD_SYMBOLS};
