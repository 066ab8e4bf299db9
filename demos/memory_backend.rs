//! Admin server on top of the in-memory account directory
//!
//! ```text
//! cargo run --example memory_backend
//! curl -i -c jar -H 'content-type: application/json' \
//!      -d '{"username":"admin","password":"correct-horse-battery"}' localhost:5800/login
//! curl -b jar localhost:5800/users
//! ```

use salvo_core::prelude::*;
use std::sync::Arc;

use password_admin::{
    routes, AdminSessionHandler, BackendConfig, CredentialPolicy, DbConnectionFactory,
    HttpSettings, MemoryAccount, MemoryConfig, SessionSettings, SessionStore,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let accounts = MemoryConfig::with_accounts([
        MemoryAccount::new("admin", "correct-horse-battery"),
        MemoryAccount::new("alice", "alice-old-password"),
        MemoryAccount::new("bob", "bob-old-password!1"),
    ]);
    let factory = DbConnectionFactory::new(BackendConfig::Memory(accounts))
        .expect("memory backend is always valid");

    // Short sessions so expiry is easy to watch
    let settings = SessionSettings::default().with_duration_seconds(120);
    let store = Arc::new(SessionStore::new(settings, factory));
    let _sweeper = store.spawn_sweeper(std::time::Duration::from_secs(10));

    let http = HttpSettings {
        secrets: vec!["demo-secret-change-in-production".to_string()],
        ..Default::default()
    };
    let rules = CredentialPolicy::default()
        .compile()
        .expect("default policy compiles");
    let sessions = AdminSessionHandler::new(Arc::clone(&store), rules, &http)
        .expect("a secret is configured");

    let acceptor = TcpListener::new("127.0.0.1:5800").bind().await;
    println!("Server running at http://127.0.0.1:5800");
    println!("Accounts: admin / correct-horse-battery, alice, bob");
    println!("Try these endpoints:");
    println!("  POST /login    - {{\"username\", \"password\"}}");
    println!("  GET  /users    - List accounts");
    println!("  POST /password - {{\"username\", \"password\"}} for the target account");
    println!("  POST /logout   - End the session");

    Server::new(acceptor).serve(routes::router(sessions)).await;
}
