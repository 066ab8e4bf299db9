//! Validated login and password-change credentials

use std::fmt;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Shape rules for usernames and passwords
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CredentialPolicy {
    /// Maximum username length in characters (default: 256)
    pub max_username_length: usize,

    /// Regex character-class body every username character must match
    /// (default: `a-zA-Z0-9_.@-`)
    pub username_allowed_characters: String,

    /// Minimum password length in characters (default: 16)
    pub min_password_length: usize,

    /// Maximum password length in characters (default: 256)
    pub max_password_length: usize,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            max_username_length: 256,
            username_allowed_characters: "a-zA-Z0-9_.@-".to_string(),
            min_password_length: 16,
            max_password_length: 256,
        }
    }
}

impl CredentialPolicy {
    /// Compile the policy into reusable rules
    pub fn compile(&self) -> Result<CredentialRules, CredentialsError> {
        let pattern = format!("^[{}]+$", self.username_allowed_characters);
        let username_pattern =
            Regex::new(&pattern).map_err(|e| CredentialsError::InvalidPolicy(e.to_string()))?;
        if self.min_password_length > self.max_password_length {
            return Err(CredentialsError::InvalidPolicy(format!(
                "min_password_length {} exceeds max_password_length {}",
                self.min_password_length, self.max_password_length
            )));
        }
        Ok(CredentialRules {
            policy: self.clone(),
            username_pattern,
        })
    }
}

/// A [`CredentialPolicy`] with its username pattern compiled
#[derive(Clone, Debug)]
pub struct CredentialRules {
    policy: CredentialPolicy,
    username_pattern: Regex,
}

impl Default for CredentialRules {
    fn default() -> Self {
        CredentialPolicy::default()
            .compile()
            .expect("default credential policy compiles")
    }
}

impl CredentialRules {
    fn check_username(&self, username: &str) -> Result<(), CredentialsError> {
        let len = username.chars().count();
        if len == 0 || len > self.policy.max_username_length {
            return Err(CredentialsError::UsernameLength {
                max: self.policy.max_username_length,
            });
        }
        if !self.username_pattern.is_match(username) {
            return Err(CredentialsError::UsernameCharacters);
        }
        Ok(())
    }

    fn check_password_length(&self, password: &str) -> Result<(), CredentialsError> {
        let len = password.chars().count();
        if len < self.policy.min_password_length || len > self.policy.max_password_length {
            return Err(CredentialsError::PasswordLength {
                min: self.policy.min_password_length,
                max: self.policy.max_password_length,
            });
        }
        Ok(())
    }
}

/// Reasons a username/password pair is rejected before reaching a backend
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("username must be between 1 and {max} characters")]
    UsernameLength { max: usize },

    #[error("username contains characters outside the allowed set")]
    UsernameCharacters,

    #[error("password must be between {min} and {max} characters")]
    PasswordLength { min: usize, max: usize },

    #[error("password must contain at least one letter")]
    PasswordMissingLetter,

    #[error("password must contain at least one number")]
    PasswordMissingDigit,

    #[error("password must contain at least one special character")]
    PasswordMissingSpecial,

    #[error("invalid credential policy: {0}")]
    InvalidPolicy(String),
}

/// Credentials used for logging in to a backend
#[derive(Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    username: String,
    password: String,
}

impl LoginCredentials {
    /// Validate and build login credentials
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        rules: &CredentialRules,
    ) -> Result<Self, CredentialsError> {
        let username = username.into();
        let password = password.into();
        rules.check_username(&username)?;
        rules.check_password_length(&password)?;
        Ok(Self { username, password })
    }

    /// Build credentials without applying any policy
    pub fn unchecked(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Target account and new password for a password change
///
/// On top of the login rules the password must contain a letter, a digit
/// and one of ``!@#$%^&*(),.?":{}|<>``.
#[derive(Clone, PartialEq, Eq)]
pub struct NewCredentials {
    username: String,
    password: String,
}

impl NewCredentials {
    /// Validate and build password-change credentials
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        rules: &CredentialRules,
    ) -> Result<Self, CredentialsError> {
        let username = username.into();
        let password = password.into();
        rules.check_username(&username)?;
        rules.check_password_length(&password)?;
        check_complexity(&password)?;
        Ok(Self { username, password })
    }

    /// Build credentials without applying any policy
    pub fn unchecked(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for NewCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCredentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

fn check_complexity(password: &str) -> Result<(), CredentialsError> {
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(CredentialsError::PasswordMissingLetter);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(CredentialsError::PasswordMissingDigit);
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        return Err(CredentialsError::PasswordMissingSpecial);
    }
    Ok(())
}
