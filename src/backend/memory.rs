//! In-memory account backend
//!
//! This is primarily for development and testing. All connections created by
//! one factory share a single [`MemoryDirectory`], so a password changed
//! through one session is what the next login checks against.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{BackendKind, DbConnection, MemoryAccount, MemoryConfig, MemoryFaults};
use crate::credentials::{LoginCredentials, NewCredentials};
use crate::error::DbError;

/// Call counters kept by a [`MemoryDirectory`]
#[derive(Debug, Default)]
pub struct MemoryStats {
    connections: AtomicUsize,
    logins: AtomicUsize,
    logouts: AtomicUsize,
}

impl MemoryStats {
    /// Connections handed out by the factory
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Calls to `login`, successful or not
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Calls to `logout`, successful or not
    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

/// Shared account table behind every [`MemoryConnection`]
#[derive(Debug)]
pub struct MemoryDirectory {
    accounts: RwLock<Vec<MemoryAccount>>,
    faults: MemoryFaults,
    stats: MemoryStats,
}

impl MemoryDirectory {
    /// Create a directory from its configuration
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            accounts: RwLock::new(config.accounts.clone()),
            faults: config.faults.clone(),
            stats: MemoryStats::default(),
        }
    }

    /// Call counters
    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    /// Current password of the first account with this username
    pub fn password_of(&self, username: &str) -> Option<String> {
        self.accounts
            .read()
            .iter()
            .find(|a| a.username == username)
            .map(|a| a.password.clone())
    }

    /// Open a new, unauthenticated connection
    pub fn connect(self: &Arc<Self>) -> MemoryConnection {
        self.stats.connections.fetch_add(1, Ordering::SeqCst);
        MemoryConnection {
            directory: Arc::clone(self),
            logged_in_as: None,
        }
    }
}

/// Connection to a [`MemoryDirectory`]
#[derive(Debug)]
pub struct MemoryConnection {
    directory: Arc<MemoryDirectory>,
    logged_in_as: Option<String>,
}

impl MemoryConnection {
    fn faults(&self) -> &MemoryFaults {
        &self.directory.faults
    }

    fn require_login(&self) -> Result<(), DbError> {
        if self.logged_in_as.is_none() {
            tracing::error!("Memory backend operation before login");
            return Err(DbError::NotConnected);
        }
        Ok(())
    }
}

#[async_trait]
impl DbConnection for MemoryConnection {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn is_authenticated(&self) -> bool {
        self.logged_in_as.is_some()
    }

    async fn login(&mut self, credentials: &LoginCredentials) -> Result<(), DbError> {
        self.directory.stats.logins.fetch_add(1, Ordering::SeqCst);
        self.logged_in_as = None;

        if self.faults().login_unreachable {
            return Err(DbError::Connectivity("memory backend unreachable".to_string()));
        }

        let accepted = self
            .directory
            .accounts
            .read()
            .iter()
            .any(|a| a.username == credentials.username() && a.password == credentials.password());
        if !accepted {
            tracing::warn!(username = credentials.username(), "Memory backend rejected login");
            return Err(DbError::AuthenticationFailed {
                username: credentials.username().to_string(),
            });
        }

        self.logged_in_as = Some(credentials.username().to_string());
        Ok(())
    }

    async fn get_users(&mut self) -> Result<Vec<String>, DbError> {
        self.require_login()?;
        if self.faults().get_users_unreachable {
            return Err(DbError::Connectivity("memory backend unreachable".to_string()));
        }
        if self.faults().get_users_query_fails {
            return Err(DbError::Query("injected get_users failure".to_string()));
        }

        let users: Vec<String> = self
            .directory
            .accounts
            .read()
            .iter()
            .map(|a| a.username.clone())
            .collect();
        tracing::debug!(count = users.len(), "Retrieved users from memory backend");
        Ok(users)
    }

    async fn set_password(&mut self, credentials: &NewCredentials) -> Result<(), DbError> {
        self.require_login()?;
        if self.faults().set_password_unreachable {
            return Err(DbError::Connectivity("memory backend unreachable".to_string()));
        }
        if self.faults().set_password_query_fails {
            return Err(DbError::Query("injected set_password failure".to_string()));
        }

        let mut accounts = self.directory.accounts.write();
        let mut matching = accounts
            .iter_mut()
            .filter(|a| a.username == credentials.username());
        let target = matching.next().ok_or_else(|| DbError::TargetNotFound {
            username: credentials.username().to_string(),
        })?;
        let extra = matching.count();
        if extra > 0 {
            return Err(DbError::AmbiguousTarget {
                username: credentials.username().to_string(),
                matches: extra + 1,
            });
        }

        target.password = credentials.password().to_string();
        tracing::info!(username = credentials.username(), "Updated password in memory backend");
        Ok(())
    }

    async fn logout(&mut self) -> Result<(), DbError> {
        self.directory.stats.logouts.fetch_add(1, Ordering::SeqCst);
        if self.logged_in_as.take().is_none() {
            return Ok(());
        }
        if self.faults().logout_unreachable {
            return Err(DbError::Connectivity("memory backend unreachable".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(config: MemoryConfig) -> Arc<MemoryDirectory> {
        Arc::new(MemoryDirectory::new(&config))
    }

    fn accounts() -> MemoryConfig {
        MemoryConfig::with_accounts([
            MemoryAccount::new("admin", "secret"),
            MemoryAccount::new("alice", "old"),
        ])
    }

    #[tokio::test]
    async fn test_operations_before_login_are_not_connected() {
        let dir = directory(accounts());
        let mut conn = dir.connect();

        assert!(matches!(conn.get_users().await, Err(DbError::NotConnected)));
        assert!(matches!(
            conn.set_password(&NewCredentials::unchecked("alice", "new")).await,
            Err(DbError::NotConnected)
        ));
        // logout when not connected is a no-op
        conn.logout().await.unwrap();
    }

    #[tokio::test]
    async fn test_login_then_list_and_change() {
        let dir = directory(accounts());
        let mut conn = dir.connect();

        conn.login(&LoginCredentials::unchecked("admin", "secret"))
            .await
            .unwrap();
        assert!(conn.is_authenticated());
        assert_eq!(conn.get_users().await.unwrap(), vec!["admin", "alice"]);

        conn.set_password(&NewCredentials::unchecked("alice", "new"))
            .await
            .unwrap();
        assert_eq!(dir.password_of("alice").as_deref(), Some("new"));

        conn.logout().await.unwrap();
        assert!(!conn.is_authenticated());
        assert!(matches!(conn.get_users().await, Err(DbError::NotConnected)));
    }

    #[tokio::test]
    async fn test_failed_login_leaves_connection_unauthenticated() {
        let dir = directory(accounts());
        let mut conn = dir.connect();

        let err = conn
            .login(&LoginCredentials::unchecked("admin", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::AuthenticationFailed { ref username } if username == "admin"));
        assert!(!conn.is_authenticated());
        assert!(matches!(conn.get_users().await, Err(DbError::NotConnected)));
    }

    #[tokio::test]
    async fn test_set_password_target_resolution() {
        let dir = directory(MemoryConfig::with_accounts([
            MemoryAccount::new("admin", "secret"),
            MemoryAccount::new("twin", "a"),
            MemoryAccount::new("twin", "b"),
        ]));
        let mut conn = dir.connect();
        conn.login(&LoginCredentials::unchecked("admin", "secret"))
            .await
            .unwrap();

        let err = conn
            .set_password(&NewCredentials::unchecked("nobody", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::TargetNotFound { .. }));

        let err = conn
            .set_password(&NewCredentials::unchecked("twin", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::AmbiguousTarget { matches: 2, .. }));
        // nothing applied
        assert_eq!(dir.password_of("twin").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let faults = MemoryFaults {
            get_users_query_fails: true,
            set_password_unreachable: true,
            logout_unreachable: true,
            ..Default::default()
        };
        let dir = directory(accounts().with_faults(faults));
        let mut conn = dir.connect();
        conn.login(&LoginCredentials::unchecked("admin", "secret"))
            .await
            .unwrap();

        assert!(matches!(conn.get_users().await, Err(DbError::Query(_))));
        assert!(matches!(
            conn.set_password(&NewCredentials::unchecked("alice", "x")).await,
            Err(DbError::Connectivity(_))
        ));
        assert!(matches!(conn.logout().await, Err(DbError::Connectivity(_))));
        assert!(!conn.is_authenticated());
        assert_eq!(dir.stats().logouts(), 1);
    }
}
