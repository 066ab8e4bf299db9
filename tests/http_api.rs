//! HTTP round trips against the in-memory backend

use std::sync::Arc;

use password_admin::{
    routes, AdminSessionHandler, BackendConfig, CredentialPolicy, DbConnectionFactory,
    HttpSettings, MemoryAccount, MemoryConfig, MemoryDirectory, MemoryFaults, SessionSettings,
    SessionStore,
};
use salvo::http::StatusCode;
use salvo::test::{ResponseExt, TestClient};
use salvo::{Response, Service};
use serde_json::{json, Value};

const BASE: &str = "http://127.0.0.1:5800";
const COOKIE: &str = "password_admin.sid";
const ADMIN_PASSWORD: &str = "correct-horse-battery";

struct App {
    service: Service,
    store: Arc<SessionStore>,
    directory: Arc<MemoryDirectory>,
}

fn app_with(config: MemoryConfig, session: SessionSettings) -> App {
    let factory = DbConnectionFactory::new(BackendConfig::Memory(config)).unwrap();
    let directory = Arc::clone(factory.memory_directory().unwrap());
    let store = Arc::new(SessionStore::new(session, factory));

    let http = HttpSettings {
        secrets: vec!["test-secret".to_string()],
        ..Default::default()
    };
    let rules = CredentialPolicy::default().compile().unwrap();
    let sessions = AdminSessionHandler::new(Arc::clone(&store), rules, &http).unwrap();

    App {
        service: Service::new(routes::router(sessions)),
        store,
        directory,
    }
}

fn accounts() -> MemoryConfig {
    MemoryConfig::with_accounts([
        MemoryAccount::new("admin", ADMIN_PASSWORD),
        MemoryAccount::new("alice", "alice-old-password"),
    ])
}

fn app() -> App {
    app_with(accounts(), SessionSettings::default())
}

/// `name=value` of the session cookie set by a response
fn session_cookie(res: &Response) -> Option<String> {
    res.cookie(COOKIE)
        .filter(|c| !c.value().is_empty())
        .map(|c| format!("{}={}", c.name(), c.value()))
}

async fn login(app: &App, username: &str, password: &str) -> Response {
    TestClient::post(format!("{}/login", BASE))
        .json(&json!({ "username": username, "password": password }))
        .send(&app.service)
        .await
}

async fn login_cookie(app: &App) -> String {
    let res = login(app, "admin", ADMIN_PASSWORD).await;
    assert_eq!(res.status_code, Some(StatusCode::NO_CONTENT));
    session_cookie(&res).expect("login sets the session cookie")
}

async fn list_users(app: &App, cookie: &str) -> Response {
    TestClient::get(format!("{}/users", BASE))
        .add_header("cookie", cookie, true)
        .send(&app.service)
        .await
}

async fn set_password(app: &App, cookie: &str, username: &str, password: &str) -> Response {
    TestClient::post(format!("{}/password", BASE))
        .add_header("cookie", cookie, true)
        .json(&json!({ "username": username, "password": password }))
        .send(&app.service)
        .await
}

async fn error_kind(res: &mut Response) -> String {
    let body: Value = res.take_json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_login_then_list_users() {
    let app = app();
    let res = login(&app, "admin", ADMIN_PASSWORD).await;

    assert_eq!(res.status_code, Some(StatusCode::NO_CONTENT));
    let jar_cookie = res.cookie(COOKIE).unwrap();
    assert_eq!(jar_cookie.http_only(), Some(true));
    assert_eq!(jar_cookie.path(), Some("/"));
    let cookie = session_cookie(&res).unwrap();
    assert_eq!(app.store.len(), 1);

    let mut res = list_users(&app, &cookie).await;
    assert_eq!(res.status_code, Some(StatusCode::OK));
    let users: Vec<String> = res.take_json().await.unwrap();
    assert_eq!(users, vec!["admin", "alice"]);
}

#[tokio::test]
async fn test_set_password() {
    let app = app();
    let cookie = login_cookie(&app).await;

    let res = set_password(&app, &cookie, "alice", "Alice-new-password-1!").await;
    assert_eq!(res.status_code, Some(StatusCode::NO_CONTENT));
    assert_eq!(
        app.directory.password_of("alice").as_deref(),
        Some("Alice-new-password-1!")
    );
}

#[tokio::test]
async fn test_set_password_failures() {
    let app = app();
    let cookie = login_cookie(&app).await;

    let mut res = set_password(&app, &cookie, "mallory", "Mallory-password-1!").await;
    assert_eq!(res.status_code, Some(StatusCode::NOT_FOUND));
    assert_eq!(error_kind(&mut res).await, "target_not_found");

    // long enough but without a special character
    let mut res = set_password(&app, &cookie, "alice", "alicenewpassword1").await;
    assert_eq!(res.status_code, Some(StatusCode::UNPROCESSABLE_ENTITY));
    assert_eq!(error_kind(&mut res).await, "invalid_credentials");
    assert_eq!(
        app.directory.password_of("alice").as_deref(),
        Some("alice-old-password")
    );
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = app();
    let cookie = login_cookie(&app).await;

    let res = TestClient::post(format!("{}/logout", BASE))
        .add_header("cookie", &cookie, true)
        .send(&app.service)
        .await;
    assert_eq!(res.status_code, Some(StatusCode::NO_CONTENT));
    let cleared = res.cookie(COOKIE).unwrap();
    assert_eq!(cleared.value(), "");
    assert!(app.store.is_empty());
    assert_eq!(app.directory.stats().logouts(), 1);

    let mut res = list_users(&app, &cookie).await;
    assert_eq!(res.status_code, Some(StatusCode::UNAUTHORIZED));
    assert_eq!(error_kind(&mut res).await, "session_not_found");
}

#[tokio::test]
async fn test_logout_without_session_succeeds() {
    let app = app();
    let res = TestClient::post(format!("{}/logout", BASE))
        .send(&app.service)
        .await;
    assert_eq!(res.status_code, Some(StatusCode::NO_CONTENT));
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = app();
    let mut res = login(&app, "admin", "not-the-right-password").await;

    assert_eq!(res.status_code, Some(StatusCode::UNAUTHORIZED));
    assert!(session_cookie(&res).is_none());
    let body: Value = res.take_json().await.unwrap();
    assert_eq!(body["error"], "authentication_failed");
    assert!(!body["message"]
        .as_str()
        .unwrap()
        .contains("not-the-right-password"));
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_invalid_login_shape() {
    let app = app();

    // shorter than the minimum password length
    let mut res = login(&app, "admin", "short").await;
    assert_eq!(res.status_code, Some(StatusCode::UNPROCESSABLE_ENTITY));
    assert_eq!(error_kind(&mut res).await, "invalid_credentials");

    let mut res = login(&app, "admin user", ADMIN_PASSWORD).await;
    assert_eq!(res.status_code, Some(StatusCode::UNPROCESSABLE_ENTITY));
    assert_eq!(error_kind(&mut res).await, "invalid_credentials");

    let res = TestClient::post(format!("{}/login", BASE))
        .raw_json("{not json")
        .send(&app.service)
        .await;
    assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));

    assert_eq!(app.directory.stats().connections(), 0);
}

#[tokio::test]
async fn test_missing_or_forged_cookie() {
    let app = app();

    let res = TestClient::get(format!("{}/users", BASE))
        .send(&app.service)
        .await;
    assert_eq!(res.status_code, Some(StatusCode::UNAUTHORIZED));

    let cookie = login_cookie(&app).await;
    let forged = format!("{}x", cookie);
    let res = list_users(&app, &forged).await;
    assert_eq!(res.status_code, Some(StatusCode::UNAUTHORIZED));

    let unsigned = format!("{}=some-session-id", COOKIE);
    let res = list_users(&app, &unsigned).await;
    assert_eq!(res.status_code, Some(StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn test_backend_faults_map_to_status() {
    let faults = MemoryFaults {
        get_users_query_fails: true,
        set_password_unreachable: true,
        ..Default::default()
    };
    let app = app_with(accounts().with_faults(faults), SessionSettings::default());
    let cookie = login_cookie(&app).await;

    let mut res = list_users(&app, &cookie).await;
    assert_eq!(res.status_code, Some(StatusCode::BAD_GATEWAY));
    assert_eq!(error_kind(&mut res).await, "query");

    let mut res = set_password(&app, &cookie, "alice", "Alice-new-password-1!").await;
    assert_eq!(res.status_code, Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(error_kind(&mut res).await, "connectivity");

    // the session survives backend faults
    assert_eq!(app.store.len(), 1);
}

#[tokio::test]
async fn test_unreachable_backend_on_login() {
    let faults = MemoryFaults {
        login_unreachable: true,
        ..Default::default()
    };
    let app = app_with(accounts().with_faults(faults), SessionSettings::default());

    let mut res = login(&app, "admin", ADMIN_PASSWORD).await;
    assert_eq!(res.status_code, Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(error_kind(&mut res).await, "connectivity");
}

#[tokio::test]
async fn test_session_limit() {
    let app = app_with(accounts(), SessionSettings::default().with_max_amount(1));
    let _first = login_cookie(&app).await;

    let mut res = login(&app, "admin", ADMIN_PASSWORD).await;
    assert_eq!(res.status_code, Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(error_kind(&mut res).await, "resource_exhausted");
    assert_eq!(app.store.len(), 1);
}

#[tokio::test]
async fn test_relogin_replaces_session() {
    let app = app();
    let first = login_cookie(&app).await;

    let res = TestClient::post(format!("{}/login", BASE))
        .add_header("cookie", &first, true)
        .json(&json!({ "username": "admin", "password": ADMIN_PASSWORD }))
        .send(&app.service)
        .await;
    assert_eq!(res.status_code, Some(StatusCode::NO_CONTENT));
    let second = session_cookie(&res).unwrap();
    assert_ne!(first, second);
    assert_eq!(app.store.len(), 1);

    assert_eq!(list_users(&app, &first).await.status_code, Some(StatusCode::UNAUTHORIZED));
    assert_eq!(list_users(&app, &second).await.status_code, Some(StatusCode::OK));
}
