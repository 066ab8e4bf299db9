//! LDAP account backend
//!
//! Binds as the administrator, lists the `name_attribute` of every entry
//! matching the configured filter and replaces the password attribute of a
//! single entry.

use async_trait::async_trait;
use ldap3::{
    dn_escape, ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope,
    SearchEntry,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::{BackendKind, DbConnection, LdapConfig};
use crate::credentials::{LoginCredentials, NewCredentials};
use crate::error::DbError;

/// LDAP result code for a rejected bind
const INVALID_CREDENTIALS: u32 = 49;

/// Result codes for a server that cannot serve the bind right now
const BUSY: u32 = 51;
const UNAVAILABLE: u32 = 52;

/// Connection to an LDAP directory
pub struct LdapConnection {
    config: Arc<LdapConfig>,
    ldap: Option<Ldap>,
}

impl std::fmt::Debug for LdapConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConnection")
            .field("dsn", &self.config.dsn)
            .field("bound", &self.ldap.is_some())
            .finish()
    }
}

impl LdapConnection {
    /// Create an unbound connection. Performs no I/O.
    pub fn new(config: Arc<LdapConfig>) -> Self {
        Self { config, ldap: None }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    /// Distinguished name the given login binds as
    fn bind_dn(&self, login: &str) -> String {
        let config = &self.config;
        let split = if config.admin_rdn_separator.is_empty() {
            None
        } else {
            login.split_once(config.admin_rdn_separator.as_str())
        };
        match split {
            Some((name, container)) => format!(
                "{}={},{}={},{}",
                config.admin_rdn_attribute,
                dn_escape(name),
                config.admin_rdn_container_attribute,
                dn_escape(container),
                config.base_bind_dn
            ),
            None => format!(
                "{}={},{}",
                config.admin_rdn_attribute,
                dn_escape(login),
                config.base_bind_dn
            ),
        }
    }

    /// The configured filter narrowed to one account
    fn account_filter(&self, username: &str) -> String {
        format!(
            "(&{}({}={}))",
            self.config.search_filter,
            self.config.name_attribute,
            ldap_escape(username)
        )
    }

    /// The bound handle, armed with the operation timeout
    fn bound(&mut self) -> Result<&mut Ldap, DbError> {
        let timeout = self.timeout();
        match self.ldap.as_mut() {
            Some(ldap) => {
                ldap.with_timeout(timeout);
                Ok(ldap)
            }
            None => {
                tracing::error!("LDAP operation before login");
                Err(DbError::NotConnected)
            }
        }
    }
}

/// Fault for a bind the server answered with a non-success result code
fn bind_failure(rc: u32, username: &str) -> DbError {
    match rc {
        BUSY | UNAVAILABLE => DbError::Connectivity(format!("LDAP server refused bind (rc {})", rc)),
        _ => DbError::AuthenticationFailed {
            username: username.to_string(),
        },
    }
}

fn connectivity(err: LdapError) -> DbError {
    DbError::Connectivity(err.to_string())
}

fn query(err: LdapError) -> DbError {
    match err {
        LdapError::LdapResult { result } => {
            DbError::Query(format!("rc={} {}", result.rc, result.text))
        }
        other => DbError::Connectivity(other.to_string()),
    }
}

#[async_trait]
impl DbConnection for LdapConnection {
    fn backend(&self) -> BackendKind {
        BackendKind::Ldap
    }

    fn is_authenticated(&self) -> bool {
        self.ldap.is_some()
    }

    async fn login(&mut self, credentials: &LoginCredentials) -> Result<(), DbError> {
        if let Some(mut previous) = self.ldap.take() {
            let _ = previous.unbind().await;
        }

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout())
            .set_starttls(self.config.use_starttls);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.dsn)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Could not reach LDAP server");
                connectivity(e)
            })?;
        ldap3::drive!(conn);
        ldap.with_timeout(self.timeout());

        let bind_dn = self.bind_dn(credentials.username());
        let bound = ldap
            .simple_bind(&bind_dn, credentials.password())
            .await
            .and_then(|result| result.success());
        match bound {
            Ok(_) => {
                tracing::info!(bind_dn = %bind_dn, "Bound to LDAP server");
                self.ldap = Some(ldap);
                Ok(())
            }
            Err(LdapError::LdapResult { result }) => {
                let _ = ldap.unbind().await;
                if result.rc == INVALID_CREDENTIALS {
                    tracing::warn!(username = credentials.username(), "LDAP rejected credentials");
                } else {
                    tracing::warn!(
                        username = credentials.username(),
                        rc = result.rc,
                        text = %result.text,
                        "LDAP bind failed"
                    );
                }
                Err(bind_failure(result.rc, credentials.username()))
            }
            Err(e) => {
                tracing::error!(error = %e, "LDAP bind aborted");
                Err(connectivity(e))
            }
        }
    }

    async fn get_users(&mut self) -> Result<Vec<String>, DbError> {
        let config = Arc::clone(&self.config);
        let ldap = self.bound()?;

        let (entries, _) = ldap
            .search(
                &config.base_dn,
                Scope::Subtree,
                &config.search_filter,
                vec![config.name_attribute.as_str()],
            )
            .await
            .and_then(|result| result.success())
            .map_err(|e| {
                tracing::error!(error = %e, "Error retrieving users");
                query(e)
            })?;

        let users: Vec<String> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .filter_map(|entry| {
                entry
                    .attrs
                    .into_iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&config.name_attribute))
                    .and_then(|(_, values)| values.into_iter().next())
            })
            .collect();
        tracing::info!(count = users.len(), "Retrieved users from LDAP server");
        Ok(users)
    }

    async fn set_password(&mut self, credentials: &NewCredentials) -> Result<(), DbError> {
        let config = Arc::clone(&self.config);
        let filter = self.account_filter(credentials.username());
        let ldap = self.bound()?;

        let (mut entries, _) = ldap
            .search(&config.base_dn, Scope::Subtree, &filter, vec!["1.1"])
            .await
            .and_then(|result| result.success())
            .map_err(|e| {
                tracing::error!(error = %e, "Error looking up account");
                query(e)
            })?;

        let dn = match entries.len() {
            0 => {
                tracing::error!(username = credentials.username(), "No account found");
                return Err(DbError::TargetNotFound {
                    username: credentials.username().to_string(),
                });
            }
            1 => SearchEntry::construct(entries.remove(0)).dn,
            matches => {
                tracing::error!(username = credentials.username(), matches, "Multiple accounts found");
                return Err(DbError::AmbiguousTarget {
                    username: credentials.username().to_string(),
                    matches,
                });
            }
        };

        tracing::info!(dn = %dn, attribute = %config.password_attribute, "Modifying password");
        ldap.modify(
            &dn,
            vec![Mod::Replace(
                config.password_attribute.as_str(),
                HashSet::from([credentials.password()]),
            )],
        )
        .await
        .and_then(|result| result.success())
        .map_err(|e| {
            tracing::error!(error = %e, "Modify operation failed");
            query(e)
        })?;
        tracing::info!(username = credentials.username(), "Updated password");
        Ok(())
    }

    async fn logout(&mut self) -> Result<(), DbError> {
        match self.ldap.take() {
            Some(mut ldap) => {
                ldap.unbind().await.map_err(|e| {
                    tracing::error!(error = %e, "Logout error");
                    connectivity(e)
                })?;
                tracing::info!("Disconnected from LDAP server");
                Ok(())
            }
            None => {
                tracing::debug!("Logout not needed");
                Ok(())
            }
        }
    }
}
