//! Per-request view of the caller's admin session

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::SharedConnection;
use crate::credentials::{CredentialRules, LoginCredentials};
use crate::error::DbError;
use crate::store::SessionStore;

/// Session wrapper placed in the depot by
/// [`AdminSessionHandler`](crate::AdminSessionHandler)
///
/// Clones share the issued/ended flags, so the middleware sees what the
/// endpoint did and can set or clear the cookie afterwards.
pub struct AdminSession {
    store: Arc<SessionStore>,
    rules: Arc<CredentialRules>,

    /// Session id from a verified cookie
    cookie_id: Option<String>,

    /// Session id created during this request
    issued: Arc<Mutex<Option<String>>>,

    /// Whether the session ended during this request
    ended: Arc<AtomicBool>,
}

impl AdminSession {
    pub(crate) fn new(
        store: Arc<SessionStore>,
        rules: Arc<CredentialRules>,
        cookie_id: Option<String>,
    ) -> Self {
        Self {
            store,
            rules,
            cookie_id,
            issued: Arc::new(Mutex::new(None)),
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Credential rules to validate request bodies with
    pub fn rules(&self) -> &CredentialRules {
        &self.rules
    }

    /// The id this request currently acts under
    pub fn id(&self) -> Option<String> {
        if self.is_ended() {
            return None;
        }
        self.issued.lock().clone().or_else(|| self.cookie_id.clone())
    }

    /// Session id created during this request, if any
    pub fn issued_id(&self) -> Option<String> {
        if self.is_ended() {
            return None;
        }
        self.issued.lock().clone()
    }

    /// Whether the session ended during this request
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Open a new session, replacing the current one
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<(), DbError> {
        if let Some(previous) = self.id() {
            self.store.destroy_session(&previous).await;
        }
        self.ended.store(true, Ordering::SeqCst);

        let id = self.store.create_session(credentials).await?;
        *self.issued.lock() = Some(id);
        self.ended.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Connection of the current session
    ///
    /// A missing or expired session also marks this one as ended so the
    /// stale cookie is cleared.
    pub async fn connection(&self) -> Result<SharedConnection, DbError> {
        let id = self.id().ok_or(DbError::SessionNotFound)?;
        let result = self.store.get_db_connection(&id).await;
        if matches!(result, Err(DbError::SessionNotFound)) {
            self.ended.store(true, Ordering::SeqCst);
        }
        result
    }

    /// End the current session. Never fails.
    pub async fn logout(&self) {
        if let Some(id) = self.id() {
            self.store.destroy_session(&id).await;
        }
        *self.issued.lock() = None;
        self.ended.store(true, Ordering::SeqCst);
    }
}

impl Clone for AdminSession {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            rules: Arc::clone(&self.rules),
            cookie_id: self.cookie_id.clone(),
            issued: Arc::clone(&self.issued),
            ended: Arc::clone(&self.ended),
        }
    }
}

impl std::fmt::Debug for AdminSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSession")
            .field("has_cookie", &self.cookie_id.is_some())
            .field("issued", &self.issued.lock().is_some())
            .field("ended", &self.is_ended())
            .finish()
    }
}
