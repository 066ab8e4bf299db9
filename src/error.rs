//! Error types
//!
//! [`DbError`] is the fault taxonomy shared by the session store and every
//! backend adapter. It carries no transport vocabulary; the HTTP layer maps
//! each kind to a status code on its own.

use thiserror::Error;

/// Faults raised by backend connections and the session store
#[derive(Debug, Error)]
pub enum DbError {
    /// Backend configuration is malformed or names a backend this build
    /// does not support
    #[error("invalid backend configuration: {0}")]
    ConfigInvalid(String),

    /// Backend could not be reached, or the transport failed mid-operation
    #[error("backend communication error: {0}")]
    Connectivity(String),

    /// Backend rejected the supplied credentials
    #[error("login failed for user '{username}'")]
    AuthenticationFailed { username: String },

    /// Operation requires a successful `login` first
    #[error("not connected, login required")]
    NotConnected,

    /// Backend operation failed after authentication
    #[error("backend query failed: {0}")]
    Query(String),

    /// Password change matched no account
    #[error("no account found for '{username}'")]
    TargetNotFound { username: String },

    /// Password change matched more than one account
    #[error("{matches} accounts match '{username}'")]
    AmbiguousTarget { username: String, matches: usize },

    /// Session id is unknown, expired or destroyed
    #[error("session not found")]
    SessionNotFound,

    /// Session limit reached
    #[error("session limit of {limit} reached")]
    ResourceExhausted { limit: usize },
}

impl DbError {
    /// Stable, machine-readable name of the fault kind
    pub fn kind(&self) -> &'static str {
        match self {
            DbError::ConfigInvalid(_) => "config_invalid",
            DbError::Connectivity(_) => "connectivity",
            DbError::AuthenticationFailed { .. } => "authentication_failed",
            DbError::NotConnected => "not_connected",
            DbError::Query(_) => "query",
            DbError::TargetNotFound { .. } => "target_not_found",
            DbError::AmbiguousTarget { .. } => "ambiguous_target",
            DbError::SessionNotFound => "session_not_found",
            DbError::ResourceExhausted { .. } => "resource_exhausted",
        }
    }

    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Connectivity(_) | DbError::ResourceExhausted { .. }
        )
    }
}
