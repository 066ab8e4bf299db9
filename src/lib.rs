//! # password-admin
//!
//! Session-scoped password administration for Salvo.
//!
//! An administrator logs in against a directory or database backend; the
//! authenticated backend connection is kept in an ephemeral, fixed-lifetime
//! session. While the session lives it can list accounts and reset their
//! passwords.
//!
//! ## Features
//!
//! - **Pluggable backends**: LDAP (`ldap` feature), PostgreSQL (`postgres`
//!   feature) and an in-memory directory for development and tests
//! - **Session lifecycle**: create, look up, destroy, expire and sweep
//! - **One error taxonomy**: every backend fault maps to a [`DbError`] kind
//! - **Signed session cookies** with secret rotation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use salvo_core::prelude::*;
//! use password_admin::{routes, AdminSessionHandler, DbConnectionFactory, SessionStore, Settings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = Settings::load(None).unwrap();
//!     let factory = DbConnectionFactory::new(settings.database.clone()).unwrap();
//!     let store = Arc::new(SessionStore::new(settings.session.clone(), factory));
//!     let rules = settings.credentials.compile().unwrap();
//!
//!     let sessions = AdminSessionHandler::new(store, rules, &settings.http).unwrap();
//!     let acceptor = TcpListener::new("127.0.0.1:8080").bind().await;
//!     Server::new(acceptor).serve(routes::router(sessions)).await;
//! }
//! ```
//!
//! Without HTTP, the store is used directly:
//!
//! ```rust,ignore
//! let id = store.create_session(&LoginCredentials::unchecked("admin", "secret")).await?;
//! let connection = store.get_db_connection(&id).await?;
//! let users = connection.lock().await.get_users().await?;
//! store.destroy_session(&id).await;
//! ```

pub mod backend;
pub mod cookie_signature;
pub mod credentials;
pub mod error;
pub mod handler;
pub mod routes;
pub mod session;
pub mod settings;
pub mod store;

pub use backend::{
    BackendConfig, BackendKind, DbConnection, DbConnectionFactory, MemoryAccount, MemoryConfig,
    MemoryDirectory, MemoryFaults, SharedConnection,
};
pub use credentials::{CredentialPolicy, CredentialRules, CredentialsError, LoginCredentials, NewCredentials};
pub use error::DbError;
pub use handler::AdminSessionHandler;
pub use session::AdminSession;
pub use settings::{HttpSettings, SessionSettings, Settings, SettingsError};
pub use store::SessionStore;

/// Extension trait for Depot to reach the admin session
pub mod depot_ext;
pub use depot_ext::AdminDepotExt;
