//! Session cookie middleware for Salvo

use async_trait::async_trait;
use salvo_core::http::cookie::{self, Cookie, SameSite};
use salvo_core::prelude::*;
use std::sync::Arc;

use crate::cookie_signature::CookieSigner;
use crate::credentials::CredentialRules;
use crate::session::AdminSession;
use crate::settings::{HttpSettings, SettingsError};
use crate::store::SessionStore;

pub(crate) const SESSION_KEY: &str = "password_admin.session";

/// Middleware binding requests to admin sessions
///
/// Reads the signed session cookie, places an [`AdminSession`] in the depot
/// and, once the endpoint ran, sets a fresh cookie for a new session or
/// clears it when the session ended.
pub struct AdminSessionHandler {
    store: Arc<SessionStore>,
    rules: Arc<CredentialRules>,
    signer: CookieSigner,
    cookie_name: String,
    cookie_secure: bool,
}

impl AdminSessionHandler {
    /// Create the middleware. Fails when no cookie secret is configured.
    pub fn new(
        store: Arc<SessionStore>,
        rules: CredentialRules,
        http: &HttpSettings,
    ) -> Result<Self, SettingsError> {
        let signer =
            CookieSigner::new(http.secrets.iter().cloned()).ok_or(SettingsError::Invalid {
                key: "http.secrets",
                reason: "at least one non-empty secret is required".to_string(),
            })?;
        Ok(Self {
            store,
            rules: Arc::new(rules),
            signer,
            cookie_name: http.cookie_name.clone(),
            cookie_secure: http.cookie_secure,
        })
    }

    /// The session store behind this middleware
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn session_id_from_cookie(&self, req: &Request) -> Option<String> {
        let value = req.cookie(&self.cookie_name)?.value();

        // Cookies may arrive URL encoded
        let decoded = match urlencoding::decode(value) {
            Ok(d) => d.into_owned(),
            Err(_) => value.to_string(),
        };

        let id = self.signer.verify(&decoded);
        if id.is_none() {
            tracing::debug!("Ignoring session cookie with invalid signature");
        }
        id
    }

    fn set_session_cookie(&self, res: &mut Response, session_id: &str) {
        let max_age = self.store.settings().duration_seconds as i64;
        let cookie = Cookie::build((self.cookie_name.clone(), self.signer.sign(session_id)))
            .path("/")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Strict)
            .max_age(cookie::time::Duration::seconds(max_age))
            .build();
        res.add_cookie(cookie);
    }

    fn remove_session_cookie(&self, res: &mut Response) {
        let cookie = Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .max_age(cookie::time::Duration::ZERO)
            .build();
        res.add_cookie(cookie);
    }
}

impl std::fmt::Debug for AdminSessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSessionHandler")
            .field("cookie_name", &self.cookie_name)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

#[async_trait]
impl Handler for AdminSessionHandler {
    async fn handle(
        &self,
        req: &mut Request,
        depot: &mut Depot,
        res: &mut Response,
        ctrl: &mut FlowCtrl,
    ) {
        let had_cookie = req.cookie(&self.cookie_name).is_some();
        let session = AdminSession::new(
            Arc::clone(&self.store),
            Arc::clone(&self.rules),
            self.session_id_from_cookie(req),
        );
        depot.insert(SESSION_KEY, session.clone());

        ctrl.call_next(req, depot, res).await;

        if let Some(id) = session.issued_id() {
            self.set_session_cookie(res, &id);
        } else if session.is_ended() && had_cookie {
            self.remove_session_cookie(res);
        }
    }
}
