//! Odaville Backend - library for app logic and testing

pub mod admin;
pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod upload;

use std::net::SocketAddr;

use anyhow::Context;
use axum::{extract::DefaultBodyLimit, middleware, Router};
use tower_http::{compression::CompressionLayer, services::ServeDir, trace::TraceLayer};

use crate::config::AppConfig;
use crate::cors::{cors_gate, CorsPolicy};
use crate::state::AppState;

/// Room for the text parts of a multipart form on top of the upload cap.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsPolicy::new(&state.config.cors);
    let body_limit = state.uploads.max_bytes() + FORM_OVERHEAD_BYTES;
    let production = state.config.environment.is_production();

    let mut app = routes::api_router(&state);
    if let Some(root) = state.config.upload.local_root() {
        tracing::info!(root = %root.display(), "Serving local uploads under /uploads");
        app = app.nest_service("/uploads", ServeDir::new(root));
    }

    let mut app = app
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(body_limit));

    if !production {
        app = app.layer(middleware::from_fn(error::expose_error_detail));
    }

    // Outermost, so preflight never reaches anything else.
    app.layer(middleware::from_fn_with_state(cors, cors_gate))
}

/// Run the server (used by main).
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;

    // Guards must live as long as the process or buffered log lines are lost.
    let _log_guards = logging::init(config.environment);

    tracing::info!(
        environment = config.environment.as_str(),
        database = config
            .database
            .as_ref()
            .map(|db| db.redacted_url())
            .unwrap_or_else(|| "memory".to_string()),
        "Configuration loaded"
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid HOST/PORT configuration")?;

    let state = AppState::from_config(config).await?;
    let app = create_app(state);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
