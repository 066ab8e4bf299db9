//! Connection factory

use std::sync::Arc;

#[cfg(feature = "ldap")]
use super::LdapConfig;
#[cfg(feature = "postgres")]
use super::PostgresConfig;
use super::{BackendConfig, BackendKind, DbConnection, MemoryDirectory};
use crate::error::DbError;

/// Backend resolved once at construction
#[derive(Debug)]
enum Resolved {
    Memory(Arc<MemoryDirectory>),
    #[cfg(feature = "ldap")]
    Ldap(Arc<LdapConfig>),
    #[cfg(feature = "postgres")]
    Postgres(Arc<PostgresConfig>),
}

/// Produces fresh, unauthenticated connections for the configured backend
#[derive(Debug)]
pub struct DbConnectionFactory {
    resolved: Resolved,
}

impl DbConnectionFactory {
    /// Validate the configuration and resolve its backend
    ///
    /// Fails with [`DbError::ConfigInvalid`] when the configuration is
    /// malformed or names a backend this build was compiled without.
    pub fn new(config: BackendConfig) -> Result<Self, DbError> {
        config.validate()?;
        let resolved = match config {
            BackendConfig::Memory(memory) => {
                Resolved::Memory(Arc::new(MemoryDirectory::new(&memory)))
            }
            #[cfg(feature = "ldap")]
            BackendConfig::Ldap(ldap) => Resolved::Ldap(Arc::new(ldap)),
            #[cfg(feature = "postgres")]
            BackendConfig::Postgres(postgres) => Resolved::Postgres(Arc::new(postgres)),
            #[allow(unreachable_patterns)]
            other => {
                return Err(DbError::ConfigInvalid(format!(
                    "backend '{}' is not supported by this build",
                    other.kind()
                )))
            }
        };
        tracing::info!(backend = %kind_of(&resolved), "Configured database backend");
        Ok(Self { resolved })
    }

    /// The backend this factory produces connections for
    pub fn backend(&self) -> BackendKind {
        kind_of(&self.resolved)
    }

    /// The shared directory, when the memory backend is configured
    pub fn memory_directory(&self) -> Option<&Arc<MemoryDirectory>> {
        match &self.resolved {
            Resolved::Memory(directory) => Some(directory),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Construct a new, unauthenticated connection. Performs no I/O.
    pub fn create(&self) -> Result<Box<dyn DbConnection>, DbError> {
        let connection: Box<dyn DbConnection> = match &self.resolved {
            Resolved::Memory(directory) => Box::new(directory.connect()),
            #[cfg(feature = "ldap")]
            Resolved::Ldap(config) => Box::new(super::LdapConnection::new(Arc::clone(config))),
            #[cfg(feature = "postgres")]
            Resolved::Postgres(config) => {
                Box::new(super::PostgresConnection::new(Arc::clone(config))?)
            }
        };
        Ok(connection)
    }
}

fn kind_of(resolved: &Resolved) -> BackendKind {
    match resolved {
        Resolved::Memory(_) => BackendKind::Memory,
        #[cfg(feature = "ldap")]
        Resolved::Ldap(_) => BackendKind::Ldap,
        #[cfg(feature = "postgres")]
        Resolved::Postgres(_) => BackendKind::Postgres,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LdapConfig, MemoryAccount, MemoryConfig, PostgresConfig};

    #[test]
    fn test_memory_factory_creates_unauthenticated_connections() {
        let factory = DbConnectionFactory::new(BackendConfig::Memory(MemoryConfig::with_accounts([
            MemoryAccount::new("user", "pass"),
        ])))
        .unwrap();
        assert_eq!(factory.backend(), BackendKind::Memory);

        let first = factory.create().unwrap();
        let second = factory.create().unwrap();
        assert!(!first.is_authenticated());
        assert!(!second.is_authenticated());
        assert_eq!(
            factory.memory_directory().unwrap().stats().connections(),
            2
        );
    }

    #[test]
    fn test_malformed_config_rejected_at_construction() {
        let err = DbConnectionFactory::new(BackendConfig::Ldap(LdapConfig {
            dsn: "ldap://".to_string(),
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(err, DbError::ConfigInvalid(_)));

        let err = DbConnectionFactory::new(BackendConfig::Postgres(PostgresConfig {
            dsn: "postgres://user:pw@localhost/postgres".to_string(),
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(err, DbError::ConfigInvalid(_)));
    }

    #[cfg(feature = "ldap")]
    #[test]
    fn test_ldap_factory_performs_no_io() {
        // Nothing listens on this port; construction must still succeed.
        let factory = DbConnectionFactory::new(BackendConfig::Ldap(LdapConfig {
            dsn: "ldap://127.0.0.1:1".to_string(),
            ..Default::default()
        }))
        .unwrap();
        let connection = factory.create().unwrap();
        assert_eq!(connection.backend(), BackendKind::Ldap);
        assert!(!connection.is_authenticated());
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_postgres_factory_performs_no_io() {
        let factory = DbConnectionFactory::new(BackendConfig::Postgres(PostgresConfig {
            dsn: "postgres://127.0.0.1:1/postgres".to_string(),
            ..Default::default()
        }))
        .unwrap();
        let connection = factory.create().unwrap();
        assert_eq!(connection.backend(), BackendKind::Postgres);
        assert!(!connection.is_authenticated());
    }
}
