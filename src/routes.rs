//! Admin endpoints
//!
//! | method & path     | body                       | success                  |
//! |-------------------|----------------------------|--------------------------|
//! | `POST /login`     | `{"username","password"}`  | `204`, sets the cookie   |
//! | `GET /users`      |                            | `200`, `["name", ...]`   |
//! | `POST /password`  | `{"username","password"}`  | `204`                    |
//! | `POST /logout`    |                            | `204`, clears the cookie |
//!
//! Failures render `{"error": kind, "message": text}`.

use async_trait::async_trait;
use salvo_core::prelude::*;
use serde::{Deserialize, Serialize};

use crate::credentials::{CredentialsError, LoginCredentials, NewCredentials};
use crate::depot_ext::AdminDepotExt;
use crate::error::DbError;
use crate::handler::AdminSessionHandler;
use crate::session::AdminSession;

/// Build the admin router behind the session middleware
pub fn router(sessions: AdminSessionHandler) -> Router {
    Router::new()
        .hoop(sessions)
        .push(Router::with_path("login").post(Login))
        .push(Router::with_path("users").get(ListUsers))
        .push(Router::with_path("password").post(SetPassword))
        .push(Router::with_path("logout").post(Logout))
}

/// HTTP status for a backend or session fault
pub fn status_for(err: &DbError) -> StatusCode {
    match err {
        DbError::AuthenticationFailed { .. } | DbError::SessionNotFound => StatusCode::UNAUTHORIZED,
        DbError::Connectivity(_) | DbError::ResourceExhausted { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        DbError::Query(_) => StatusCode::BAD_GATEWAY,
        DbError::TargetNotFound { .. } => StatusCode::NOT_FOUND,
        DbError::AmbiguousTarget { .. } => StatusCode::CONFLICT,
        DbError::NotConnected | DbError::ConfigInvalid(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Deserialize)]
struct CredentialsBody {
    username: String,
    password: String,
}

fn render_error(res: &mut Response, status: StatusCode, error: &str, message: String) {
    res.status_code(status);
    res.render(Json(ErrorBody {
        error: error.to_string(),
        message,
    }));
}

fn render_fault(res: &mut Response, err: &DbError) {
    render_error(res, status_for(err), err.kind(), err.to_string());
}

fn render_invalid(res: &mut Response, err: &CredentialsError) {
    render_error(
        res,
        StatusCode::UNPROCESSABLE_ENTITY,
        "invalid_credentials",
        err.to_string(),
    );
}

/// Session from the depot; renders 500 when the middleware is missing
fn session_or_render(depot: &Depot, res: &mut Response) -> Option<AdminSession> {
    let session = depot.admin_session().cloned();
    if session.is_none() {
        tracing::error!("Admin endpoint mounted without session middleware");
        render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "session middleware missing".to_string(),
        );
    }
    session
}

async fn parse_body(req: &mut Request, res: &mut Response) -> Option<CredentialsBody> {
    match req.parse_json::<CredentialsBody>().await {
        Ok(body) => Some(body),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected request body");
            render_error(res, StatusCode::BAD_REQUEST, "bad_request", e.to_string());
            None
        }
    }
}

/// `POST /login`
pub struct Login;

#[async_trait]
impl Handler for Login {
    async fn handle(&self, req: &mut Request, depot: &mut Depot, res: &mut Response, _ctrl: &mut FlowCtrl) {
        let Some(session) = session_or_render(depot, res) else {
            return;
        };
        let Some(body) = parse_body(req, res).await else {
            return;
        };
        let credentials = match LoginCredentials::new(body.username, body.password, session.rules()) {
            Ok(credentials) => credentials,
            Err(e) => return render_invalid(res, &e),
        };

        match session.login(&credentials).await {
            Ok(()) => {
                res.status_code(StatusCode::NO_CONTENT);
            }
            Err(e) => render_fault(res, &e),
        }
    }
}

/// `GET /users`
pub struct ListUsers;

#[async_trait]
impl Handler for ListUsers {
    async fn handle(&self, _req: &mut Request, depot: &mut Depot, res: &mut Response, _ctrl: &mut FlowCtrl) {
        let Some(session) = session_or_render(depot, res) else {
            return;
        };
        let connection = match session.connection().await {
            Ok(connection) => connection,
            Err(e) => return render_fault(res, &e),
        };

        let users = connection.lock().await.get_users().await;
        match users {
            Ok(users) => {
                res.status_code(StatusCode::OK);
                res.render(Json(users));
            }
            Err(e) => render_fault(res, &e),
        }
    }
}

/// `POST /password`
pub struct SetPassword;

#[async_trait]
impl Handler for SetPassword {
    async fn handle(&self, req: &mut Request, depot: &mut Depot, res: &mut Response, _ctrl: &mut FlowCtrl) {
        let Some(session) = session_or_render(depot, res) else {
            return;
        };
        let connection = match session.connection().await {
            Ok(connection) => connection,
            Err(e) => return render_fault(res, &e),
        };
        let Some(body) = parse_body(req, res).await else {
            return;
        };
        let credentials = match NewCredentials::new(body.username, body.password, session.rules()) {
            Ok(credentials) => credentials,
            Err(e) => return render_invalid(res, &e),
        };

        let result = connection.lock().await.set_password(&credentials).await;
        match result {
            Ok(()) => {
                res.status_code(StatusCode::NO_CONTENT);
            }
            Err(e) => render_fault(res, &e),
        }
    }
}

/// `POST /logout`
pub struct Logout;

#[async_trait]
impl Handler for Logout {
    async fn handle(&self, _req: &mut Request, depot: &mut Depot, res: &mut Response, _ctrl: &mut FlowCtrl) {
        let Some(session) = session_or_render(depot, res) else {
            return;
        };
        session.logout().await;
        res.status_code(StatusCode::NO_CONTENT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (DbError::ConfigInvalid("x".into()), 500),
            (DbError::Connectivity("x".into()), 503),
            (
                DbError::AuthenticationFailed {
                    username: "admin".into(),
                },
                401,
            ),
            (DbError::NotConnected, 500),
            (DbError::Query("x".into()), 502),
            (
                DbError::TargetNotFound {
                    username: "bob".into(),
                },
                404,
            ),
            (
                DbError::AmbiguousTarget {
                    username: "bob".into(),
                    matches: 2,
                },
                409,
            ),
            (DbError::SessionNotFound, 401),
            (DbError::ResourceExhausted { limit: 1 }, 503),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err).as_u16(), status, "{:?}", err);
        }
    }
}
