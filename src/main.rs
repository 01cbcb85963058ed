use axum::{ServiceExt, extract::Request};
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bookshelf::config::Config;
use bookshelf::db::Database;
use bookshelf::oidc::OidcClient;
use bookshelf::views::Views;
use bookshelf::{AppState, build_app};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Production takes its environment from the host only.
    if std::env::var("NODE_ENV").as_deref() != Ok("production") {
        dotenvy::dotenv().ok();
    }

    let cfg = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        public_dir = %cfg.public_dir.display(),
        views_dir = %cfg.views_dir.display(),
        loglevel = %cfg.loglevel
    );

    let views = Views::load(&cfg.views_dir)?;
    let oidc = OidcClient::new(cfg.identity()?)?;

    // The server starts whether or not the database comes up.
    let db = Database::disconnected();
    db.spawn_connect(cfg.database_url.clone());

    let port = cfg.port;
    let environment = cfg.node_env.clone().unwrap_or_else(|| "development".to_string());
    let state = AppState::new(cfg, db, oidc, views);
    let app = build_app(state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Server is running at http://localhost:{port} in {environment} mode");
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
