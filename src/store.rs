//! Session store
//!
//! Maps opaque session ids to authenticated backend connections with a fixed
//! lifetime. Each session owns a private connection obtained from the
//! [`DbConnectionFactory`]; nothing is shared between sessions and nothing
//! survives a restart.

use parking_lot::RwLock;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{DbConnectionFactory, SharedConnection};
use crate::credentials::LoginCredentials;
use crate::error::DbError;
use crate::settings::{SessionSettings, MIN_SESSION_ID_LENGTH};

/// Fresh ids tried before giving up on a crowded id space
const MAX_ID_ATTEMPTS: usize = 16;

struct Session {
    connection: SharedConnection,
    expires_at: Instant,
}

impl Session {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Live admin sessions keyed by id
///
/// The map lock is never held across backend I/O. Removing an entry from the
/// map is what hands its connection over for logout, so a connection is
/// logged out at most once by the store. Expired sessions are logged out on
/// detached tasks: a request still holding one session's connection never
/// stalls callers working on other sessions.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    factory: DbConnectionFactory,
    settings: SessionSettings,
}

impl SessionStore {
    /// Create an empty store
    ///
    /// Ids shorter than [`MIN_SESSION_ID_LENGTH`] are raised to it.
    pub fn new(mut settings: SessionSettings, factory: DbConnectionFactory) -> Self {
        if settings.id_length < MIN_SESSION_ID_LENGTH {
            tracing::warn!(
                requested = settings.id_length,
                used = MIN_SESSION_ID_LENGTH,
                "Session id length too short, raised"
            );
            settings.id_length = MIN_SESSION_ID_LENGTH;
        }
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            settings,
        }
    }

    /// The factory sessions draw their connections from
    pub fn factory(&self) -> &DbConnectionFactory {
        &self.factory
    }

    /// Lifetime, id length and limits sessions are created with
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Log in to the backend and open a session
    ///
    /// Faults from the factory and from `login` are returned unchanged and
    /// leave no session behind. Every call yields a fresh id and a fresh
    /// connection, even for identical credentials.
    pub async fn create_session(&self, credentials: &LoginCredentials) -> Result<String, DbError> {
        self.purge_expired().await;
        self.check_capacity()?;

        let mut connection = self.factory.create()?;
        connection.login(credentials).await?;

        let expires_at = Instant::now() + self.settings.duration();
        let connection: SharedConnection = Arc::new(Mutex::new(connection));
        let inserted = {
            let mut sessions = self.sessions.write();
            if sessions.len() >= self.settings.max_amount {
                None
            } else {
                let id = unused_session_id(
                    |id| sessions.contains_key(id),
                    || generate_session_id(self.settings.id_length),
                );
                if let Some(id) = &id {
                    sessions.insert(
                        id.clone(),
                        Session {
                            connection: Arc::clone(&connection),
                            expires_at,
                        },
                    );
                } else {
                    tracing::warn!(
                        attempts = MAX_ID_ATTEMPTS,
                        "Could not find an unused session id"
                    );
                }
                id
            }
        };

        match inserted {
            Some(id) => {
                tracing::info!(
                    session = %redact(&id),
                    backend = %self.factory.backend(),
                    username = credentials.username(),
                    "Session created"
                );
                Ok(id)
            }
            None => {
                logout_quietly(&connection).await;
                Err(self.exhausted())
            }
        }
    }

    /// Look up the connection of a live session
    ///
    /// Unknown, destroyed and expired ids all fail with
    /// [`DbError::SessionNotFound`]. Lookups never extend a session.
    pub async fn get_db_connection(&self, session_id: &str) -> Result<SharedConnection, DbError> {
        let now = Instant::now();
        {
            let sessions = self.sessions.read();
            match sessions.get(session_id) {
                Some(session) if !session.is_expired(now) => {
                    return Ok(Arc::clone(&session.connection));
                }
                Some(_) => {}
                None => {
                    tracing::debug!(session = %redact(session_id), "Session not found");
                    return Err(DbError::SessionNotFound);
                }
            }
        }

        let expired = {
            let mut sessions = self.sessions.write();
            match sessions.get(session_id) {
                Some(session) if session.is_expired(now) => sessions.remove(session_id),
                _ => None,
            }
        };
        if let Some(session) = expired {
            tracing::info!(session = %redact(session_id), "Session expired");
            logout_detached(session.connection);
        }
        Err(DbError::SessionNotFound)
    }

    /// End a session
    ///
    /// Logout faults are logged and swallowed, and unknown ids are ignored,
    /// so this never fails.
    pub async fn destroy_session(&self, session_id: &str) {
        let removed = self.sessions.write().remove(session_id);
        match removed {
            Some(session) => {
                logout_quietly(&session.connection).await;
                tracing::info!(session = %redact(session_id), "Session destroyed");
            }
            None => {
                tracing::debug!(session = %redact(session_id), "Nothing to destroy");
            }
        }
    }

    /// Drop every expired session and log its connection out
    ///
    /// Returns the number of sessions removed. Logouts run on detached
    /// tasks, so this returns without waiting for the backends.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Session> = {
            let mut sessions = self.sessions.write();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| session.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        let count = expired.len();
        for session in expired {
            logout_detached(session.connection);
        }
        if count > 0 {
            tracing::info!(count, "Purged expired sessions");
        }
        count
    }

    /// Destroy every session
    pub async fn shutdown(&self) {
        let drained: Vec<Session> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            logout_quietly(&session.connection).await;
        }
        tracing::info!(count = drained.len(), "Closed all sessions");
    }

    /// Number of live (unexpired) sessions
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .values()
            .filter(|session| !session.is_expired(now))
            .count()
    }

    /// Returns `true` if there are no live sessions
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Purge expired sessions every `period` until the store is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.purge_expired().await;
            }
        })
    }

    fn check_capacity(&self) -> Result<(), DbError> {
        if self.sessions.read().len() >= self.settings.max_amount {
            return Err(self.exhausted());
        }
        Ok(())
    }

    fn exhausted(&self) -> DbError {
        tracing::warn!(limit = self.settings.max_amount, "Session limit reached");
        DbError::ResourceExhausted {
            limit: self.settings.max_amount,
        }
    }
}

/// Log a connection out, logging any fault instead of returning it
async fn logout_quietly(connection: &SharedConnection) {
    let mut connection = connection.lock().await;
    if let Err(e) = connection.logout().await {
        tracing::warn!(error = %e, "Logout failed while ending session");
    }
}

/// Log a connection out on its own task
///
/// Waiting for the connection lock would otherwise tie the caller to
/// whatever request still holds it.
fn logout_detached(connection: SharedConnection) {
    tokio::spawn(async move {
        logout_quietly(&connection).await;
    });
}

/// First generated id not yet taken, or `None` after [`MAX_ID_ATTEMPTS`]
fn unused_session_id(
    taken: impl Fn(&str) -> bool,
    mut generate: impl FnMut() -> String,
) -> Option<String> {
    (0..MAX_ID_ATTEMPTS)
        .map(|_| generate())
        .find(|id| !taken(id.as_str()))
}

/// Generate a random alphanumeric session id
fn generate_session_id(length: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Leading characters of a session id, safe to log
fn redact(session_id: &str) -> String {
    let prefix: String = session_id.chars().take(6).collect();
    format!("{}…", prefix)
}
