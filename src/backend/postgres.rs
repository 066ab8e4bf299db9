//! PostgreSQL account backend
//!
//! Logs in by opening a single connection as the administrator's database
//! role, then runs the configured listing and password queries.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::str::FromStr;
use std::sync::Arc;

use super::{BackendKind, DbConnection, PostgresConfig};
use crate::credentials::{LoginCredentials, NewCredentials};
use crate::error::DbError;

/// Connection to a PostgreSQL database
pub struct PostgresConnection {
    config: Arc<PostgresConfig>,
    options: PgConnectOptions,
    password_sql: String,
    conn: Option<PgConnection>,
}

impl std::fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("host", &self.options.get_host())
            .field("database", &self.options.get_database())
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl PostgresConnection {
    /// Create an unconnected handle. Performs no I/O.
    pub fn new(config: Arc<PostgresConfig>) -> Result<Self, DbError> {
        let options = PgConnectOptions::from_str(&config.dsn)
            .map_err(|e| DbError::ConfigInvalid(format!("postgres dsn: {}", e)))?;
        let password_sql = password_statement(&config.password_query);
        Ok(Self {
            config,
            options,
            password_sql,
            conn: None,
        })
    }

    fn connected(&mut self) -> Result<&mut PgConnection, DbError> {
        match self.conn.as_mut() {
            Some(conn) => Ok(conn),
            None => {
                tracing::error!("PostgreSQL operation before login");
                Err(DbError::NotConnected)
            }
        }
    }
}

/// Rewrite `%p`/`%u` into positional parameters `$1` (password) and `$2`
/// (username)
fn password_statement(template: &str) -> String {
    template.replace("%p", "$1").replace("%u", "$2")
}

/// SQLSTATE class 28: invalid authorization specification
fn is_auth_failure(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().is_some_and(|code| code.starts_with("28")),
        _ => false,
    }
}

fn query(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
            DbError::Connectivity(err.to_string())
        }
        other => DbError::Query(other.to_string()),
    }
}

#[async_trait]
impl DbConnection for PostgresConnection {
    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn is_authenticated(&self) -> bool {
        self.conn.is_some()
    }

    async fn login(&mut self, credentials: &LoginCredentials) -> Result<(), DbError> {
        if let Some(previous) = self.conn.take() {
            let _ = previous.close().await;
        }

        let options = self
            .options
            .clone()
            .username(credentials.username())
            .password(credentials.password());
        match PgConnection::connect_with(&options).await {
            Ok(conn) => {
                tracing::info!("Connected to PostgreSQL database");
                self.conn = Some(conn);
                Ok(())
            }
            Err(e) if is_auth_failure(&e) => {
                tracing::warn!(username = credentials.username(), error = %e, "PostgreSQL rejected login");
                Err(DbError::AuthenticationFailed {
                    username: credentials.username().to_string(),
                })
            }
            Err(sqlx::Error::Configuration(e)) => Err(DbError::ConfigInvalid(e.to_string())),
            Err(e) => {
                tracing::error!(username = credentials.username(), error = %e, "Login error");
                Err(DbError::Connectivity(e.to_string()))
            }
        }
    }

    async fn get_users(&mut self) -> Result<Vec<String>, DbError> {
        let config = Arc::clone(&self.config);
        let conn = self.connected()?;

        let users: Vec<String> = sqlx::query_scalar(&config.users_query)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Error retrieving users");
                query(e)
            })?;
        tracing::info!(count = users.len(), "Retrieved users from PostgreSQL database");
        Ok(users)
    }

    async fn set_password(&mut self, credentials: &NewCredentials) -> Result<(), DbError> {
        let sql = self.password_sql.clone();
        let conn = self.connected()?;

        let mut tx = conn.begin().await.map_err(query)?;
        let affected = sqlx::query(&sql)
            .bind(credentials.password())
            .bind(credentials.username())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Error updating password");
                query(e)
            })?
            .rows_affected();

        match affected {
            1 => {
                tx.commit().await.map_err(query)?;
                tracing::info!(username = credentials.username(), "Updated password");
                Ok(())
            }
            0 => {
                tx.rollback().await.map_err(query)?;
                tracing::warn!(username = credentials.username(), "No account found");
                Err(DbError::TargetNotFound {
                    username: credentials.username().to_string(),
                })
            }
            matches => {
                tx.rollback().await.map_err(query)?;
                tracing::error!(username = credentials.username(), matches, "Multiple accounts matched, rolled back");
                Err(DbError::AmbiguousTarget {
                    username: credentials.username().to_string(),
                    matches: matches as usize,
                })
            }
        }
    }

    async fn logout(&mut self) -> Result<(), DbError> {
        match self.conn.take() {
            Some(conn) => {
                conn.close().await.map_err(|e| {
                    tracing::error!(error = %e, "Logout error");
                    DbError::Connectivity(e.to_string())
                })?;
                tracing::info!("Disconnected from PostgreSQL database");
                Ok(())
            }
            None => {
                tracing::debug!("Logout not needed");
                Ok(())
            }
        }
    }
}
