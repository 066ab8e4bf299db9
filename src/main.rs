//! password-admin server

use anyhow::Context;
use clap::Parser;
use salvo_core::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use password_admin::{routes, AdminSessionHandler, DbConnectionFactory, SessionStore, Settings};

const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "password-admin", version, about = "Reset account passwords through an admin session")]
struct Cli {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long, env = "PASSWORD_ADMIN_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides http.bind
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Exiting: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(bind) = cli.bind {
        settings.http.bind = bind;
    }

    let factory = DbConnectionFactory::new(settings.database.clone()).context("backend configuration")?;
    let rules = settings.credentials.compile()?;
    let store = Arc::new(SessionStore::new(settings.session.clone(), factory));
    let sessions = AdminSessionHandler::new(Arc::clone(&store), rules, &settings.http)?;

    let sweeper = store.spawn_sweeper(settings.session.duration().min(MAX_SWEEP_PERIOD));

    let acceptor = TcpListener::new(settings.http.bind.clone())
        .try_bind()
        .await
        .with_context(|| format!("binding {}", settings.http.bind))?;
    tracing::info!(
        bind = %settings.http.bind,
        backend = %store.factory().backend(),
        "Listening"
    );

    let server = Server::new(acceptor);
    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            handle.stop_graceful(None);
        }
    });
    server.serve(routes::router(sessions)).await;

    sweeper.abort();
    store.shutdown().await;
    Ok(())
}
