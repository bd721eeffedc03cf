use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use realty_insight::backend::memory::InMemoryBackend;
use realty_insight::backend::HostedBackend;
use realty_insight::config::{self, AppConfig};
use realty_insight::context::AuthContext;
use realty_insight::is_production;
use realty_insight::shell::{self, ShellState};
use realty_insight::types::Role;

#[derive(Parser)]
#[command(name = "realty-insight")]
#[command(about = "RealtyInsight auth shell - session state, route guarding and navigation over HTTP")]
#[command(version)]
struct Args {
    #[arg(long, help = "Port to listen on (overrides PORT/SERVER_PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Seed the in-memory backend with one account per role")]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up BACKEND_URL, AUTH_*, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("realty_insight=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();

    // Initialize configuration (this loads the config singleton)
    let config = config::config();
    tracing::info!("Starting RealtyInsight in {:?} mode", config.environment);

    let auth = build_context(config, args.demo)?;
    auth.init().await;

    let notifications = auth.notifier().subscribe();
    tokio::spawn(log_notifications(notifications));

    let app = shell::app(
        ShellState::new(auth.clone(), config.upload.clone()),
        &config.server.cors_origins,
        config.server.enable_request_logging,
    );

    let port = args.port.unwrap_or(config.server.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("RealtyInsight listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server")?;

    auth.dispose();
    Ok(())
}

fn build_context(config: &AppConfig, demo: bool) -> anyhow::Result<AuthContext> {
    if config.backend.url.is_some() {
        let backend = HostedBackend::new(&config.backend).context("failed to configure hosted backend")?;
        tracing::info!("Using hosted backend");
        return Ok(AuthContext::with_backend(Arc::new(backend), config.auth.clone()));
    }

    if is_production!() {
        anyhow::bail!("BACKEND_URL must be set in production");
    }

    tracing::warn!("BACKEND_URL not set, using the in-memory backend");
    let backend = InMemoryBackend::new(&config.auth);
    if demo {
        seed_demo_accounts(&backend);
    }
    Ok(AuthContext::with_backend(Arc::new(backend), config.auth.clone()))
}

fn seed_demo_accounts(backend: &InMemoryBackend) {
    for (email, name, role) in [
        ("admin@realty.test", "Avery Admin", Role::SuperAdmin),
        ("landlord@realty.test", "Lee Landlord", Role::Landlord),
        ("tenant@realty.test", "Taylor Tenant", Role::Tenant),
    ] {
        backend.add_account(email, "password", Some(name), role);
        tracing::info!("Seeded demo {} account {}", role, email);
    }
}

async fn log_notifications(mut rx: tokio::sync::broadcast::Receiver<realty_insight::context::Notification>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match rx.recv().await {
            Ok(n) => tracing::info!("[{:?}] {}: {}", n.level, n.title, n.description),
            Err(RecvError::Lagged(skipped)) => tracing::debug!("Skipped {} notifications", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
