//! Process settings
//!
//! Loaded from an optional file followed by `PASSWORD_ADMIN_*` environment
//! variables, with `__` separating nested keys:
//!
//! ```text
//! PASSWORD_ADMIN_DATABASE__TYPE=ldap
//! PASSWORD_ADMIN_DATABASE__BASE_DN=dc=example,dc=com
//! PASSWORD_ADMIN_SESSION__DURATION_SECONDS=600
//! PASSWORD_ADMIN_HTTP__SECRETS=new-secret,old-secret
//! ```

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::backend::BackendConfig;
use crate::credentials::CredentialPolicy;

/// Errors raised while loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Shortest accepted session id
pub const MIN_SESSION_ID_LENGTH: usize = 16;

/// Session lifetime and limits
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Length of generated session ids (default: 64, at least 16)
    pub id_length: usize,

    /// Fixed lifetime of a session in seconds (default: 900)
    pub duration_seconds: u64,

    /// Maximum number of live sessions (default: 1024)
    pub max_amount: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            id_length: 64,
            duration_seconds: 900,
            max_amount: 1024,
        }
    }
}

impl SessionSettings {
    /// Set the session lifetime in seconds
    pub fn with_duration_seconds(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    /// Set the maximum number of live sessions
    pub fn with_max_amount(mut self, max_amount: usize) -> Self {
        self.max_amount = max_amount;
        self
    }

    /// Get the session lifetime as Duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }
}

/// HTTP listener and session cookie
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Listen address (default: "127.0.0.1:8080")
    pub bind: String,

    /// Name of the session cookie (default: "password_admin.sid")
    pub cookie_name: String,

    /// Secure flag for the cookie (default: false)
    pub cookie_secure: bool,

    /// Cookie signing secrets. The first signs, all verify.
    pub secrets: Vec<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            cookie_name: "password_admin.sid".to_string(),
            cookie_secure: false,
            secrets: Vec::new(),
        }
    }
}

/// Application settings
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: BackendConfig,
    pub session: SessionSettings,
    pub credentials: CredentialPolicy,
    pub http: HttpSettings,
}

impl Settings {
    /// Environment variable prefix
    pub const ENV_PREFIX: &'static str = "PASSWORD_ADMIN";

    /// Load settings from an optional file and the process environment
    pub fn load(file: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_from(file, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(Self::ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("http.secrets")
            .try_parsing(true)
    }

    fn load_from(file: Option<&Path>, environment: Environment) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }
        let settings: Settings = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<(), SettingsError> {
        let positive = [
            ("session.id_length", self.session.id_length as u64),
            ("session.duration_seconds", self.session.duration_seconds),
            ("session.max_amount", self.session.max_amount as u64),
            (
                "credentials.max_username_length",
                self.credentials.max_username_length as u64,
            ),
            (
                "credentials.min_password_length",
                self.credentials.min_password_length as u64,
            ),
            (
                "credentials.max_password_length",
                self.credentials.max_password_length as u64,
            ),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(SettingsError::Invalid {
                    key,
                    reason: "must be positive".to_string(),
                });
            }
        }
        if self.session.id_length < MIN_SESSION_ID_LENGTH {
            return Err(SettingsError::Invalid {
                key: "session.id_length",
                reason: format!("must be at least {}", MIN_SESSION_ID_LENGTH),
            });
        }
        self.credentials
            .compile()
            .map_err(|e| SettingsError::Invalid {
                key: "credentials",
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
