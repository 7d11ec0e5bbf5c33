//! Input policies applied before anything reaches the directory
//!
//! Both policies run identically on create and, for fields that are present,
//! on update.

use warden_core::{IdentityPatch, NewIdentity, PolicyConfig, ValidationKind, WardenError, WardenResult};

/// Characters that satisfy the "special character" rule
pub const PASSWORD_SYMBOLS: &str = "!@#$%^&*(),.?\":{}|<>";

const PASSWORD_RULES: &str = "Password must be at least 8 characters long and contain at least \
     one uppercase letter, one lowercase letter, one number, and one special character";

/// Password strength policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { min_length: 8 }
    }
}

impl PasswordPolicy {
    pub fn check(&self, password: &str) -> WardenResult<()> {
        let long_enough = password.chars().count() >= self.min_length;
        let has_upper = password.chars().any(|c| c.is_uppercase());
        let has_lower = password.chars().any(|c| c.is_lowercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_symbol = password.chars().any(|c| PASSWORD_SYMBOLS.contains(c));

        if long_enough && has_upper && has_lower && has_digit && has_symbol {
            Ok(())
        } else {
            Err(WardenError::validation(
                ValidationKind::WeakPassword,
                PASSWORD_RULES,
            ))
        }
    }
}

/// Institutional email policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailPolicy {
    /// Bare domain, e.g. `perlametro.cl`
    pub domain: String,
    /// One literal accepted outside the domain
    pub bootstrap_email: Option<String>,
}

impl EmailPolicy {
    /// Check the email and return its normalized (trimmed, lowercased) form
    pub fn normalize(&self, email: &str) -> WardenResult<String> {
        let email = email.trim().to_lowercase();

        let well_formed = match email.split_once('@') {
            Some((local, host)) => !local.is_empty() && !host.is_empty() && !host.contains('@'),
            None => false,
        };
        if !well_formed || email.chars().any(char::is_whitespace) {
            return Err(WardenError::invalid_input(format!(
                "'{}' is not a valid email address",
                email
            )));
        }

        let is_bootstrap = self
            .bootstrap_email
            .as_deref()
            .is_some_and(|bootstrap| bootstrap.eq_ignore_ascii_case(&email));
        let suffix = format!("@{}", self.domain.to_lowercase());

        if is_bootstrap || email.ends_with(&suffix) {
            Ok(email)
        } else {
            Err(WardenError::validation(
                ValidationKind::NonInstitutionalEmail,
                format!("Email must belong to the institutional domain ({})", suffix),
            ))
        }
    }
}

/// Combined policy for identity input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPolicy {
    pub password: PasswordPolicy,
    pub email: EmailPolicy,
}

impl From<&PolicyConfig> for InputPolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            password: PasswordPolicy::default(),
            email: EmailPolicy {
                domain: config.institutional_domain.trim().to_string(),
                bootstrap_email: config.bootstrap_email.clone(),
            },
        }
    }
}

impl InputPolicy {
    /// Validate a create request; returns it with the email normalized
    pub fn check_new(&self, mut data: NewIdentity) -> WardenResult<NewIdentity> {
        data.name = check_name(&data.name)?;
        data.email = self.email.normalize(&data.email)?;
        self.password.check(&data.password)?;
        Ok(data)
    }

    /// Validate the fields present in a patch; returns it normalized
    pub fn check_patch(&self, mut patch: IdentityPatch) -> WardenResult<IdentityPatch> {
        if let Some(name) = &patch.name {
            patch.name = Some(check_name(name)?);
        }
        if let Some(email) = &patch.email {
            patch.email = Some(self.email.normalize(email)?);
        }
        if let Some(password) = &patch.password {
            self.password.check(password)?;
        }
        Ok(patch)
    }
}

fn check_name(name: &str) -> WardenResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WardenError::invalid_input("Name must not be empty"));
    }
    Ok(name.to_string())
}
