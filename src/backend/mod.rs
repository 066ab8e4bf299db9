//! Backend connections
//!
//! Every backend implements [`DbConnection`]; [`DbConnectionFactory`] picks the
//! implementation from the configured [`BackendConfig`].

mod config;
mod factory;
mod memory;

#[cfg(feature = "ldap")]
mod ldap;

#[cfg(feature = "postgres")]
mod postgres;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::credentials::{LoginCredentials, NewCredentials};
use crate::error::DbError;

pub use config::{
    BackendConfig, LdapConfig, MemoryAccount, MemoryConfig, MemoryFaults, PostgresConfig,
};
pub use factory::DbConnectionFactory;
pub use memory::{MemoryConnection, MemoryDirectory, MemoryStats};

#[cfg(feature = "ldap")]
pub use ldap::LdapConnection;

#[cfg(feature = "postgres")]
pub use postgres::PostgresConnection;

/// A connection handle shared between the session store and request handlers.
///
/// Two handles refer to the same connection iff `Arc::ptr_eq` holds.
pub type SharedConnection = Arc<Mutex<Box<dyn DbConnection>>>;

/// The closed set of supported backends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Memory,
    Ldap,
    Postgres,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Ldap => write!(f, "ldap"),
            BackendKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// An account backend an administrator authenticates against
///
/// A connection starts unauthenticated. `login` moves it to the
/// authenticated state, `logout` moves it back. `get_users` and
/// `set_password` fail with [`DbError::NotConnected`] outside the
/// authenticated state, and a failed `login` never leaves it authenticated.
#[async_trait]
pub trait DbConnection: fmt::Debug + Send + Sync + 'static {
    /// Which backend this connection talks to
    fn backend(&self) -> BackendKind;

    /// Whether `login` succeeded and `logout` has not been called since
    fn is_authenticated(&self) -> bool;

    /// Bind to the backend as the given user
    ///
    /// Fails with [`DbError::AuthenticationFailed`] when the backend rejects
    /// the credentials and [`DbError::Connectivity`] when it cannot be reached.
    async fn login(&mut self, credentials: &LoginCredentials) -> Result<(), DbError>;

    /// List the account identifiers visible to the logged-in user
    async fn get_users(&mut self) -> Result<Vec<String>, DbError>;

    /// Replace the password of exactly one account
    ///
    /// Fails with [`DbError::TargetNotFound`] or [`DbError::AmbiguousTarget`]
    /// without changing anything when the username does not resolve to a
    /// single account.
    async fn set_password(&mut self, credentials: &NewCredentials) -> Result<(), DbError>;

    /// Release the backend session
    ///
    /// A no-op when not logged in. On a transport error the connection is
    /// still left unauthenticated.
    async fn logout(&mut self) -> Result<(), DbError>;
}
