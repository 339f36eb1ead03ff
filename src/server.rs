//! Server assembly: middleware stack, listener, graceful shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, middleware};
use serde_json::json;
use tower::{BoxError, ServiceBuilder};
use tower_http::cors::CorsLayer;

use crate::api::{self, AppState, SharedState};
use crate::auth::{self, TokenKeys};
use crate::db::{DbHandle, Store};

/// Runtime settings for one server instance. CLI flags, config file,
/// and environment are already merged by the time this is built.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub strict_transitions: bool,
    pub request_timeout_secs: u64,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            db_path: PathBuf::from(".gearguard/gearguard.db"),
            jwt_secret: String::new(),
            token_ttl_days: 7,
            strict_transitions: false,
            request_timeout_secs: 30,
            dev_mode: false,
        }
    }
}

/// Wrap the API routes with the authentication gate and a request
/// timeout. The gate sits inside the timeout so a stalled token check
/// is cut off too.
pub fn build_router(state: SharedState, timeout: Duration) -> Router {
    api::api_router()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(timeout),
        )
        .with_state(state)
}

/// A request that outruns the timeout becomes a 503 instead of a hung
/// connection.
async fn handle_timeout_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"success": false, "message": "Request timed out"})),
        )
            .into_response()
    } else {
        tracing::error!(error = %err, "middleware failure");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "message": "Internal server error"})),
        )
            .into_response()
    }
}

pub async fn start_server(config: ServerConfig) -> Result<()> {
    if config.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET is empty; refusing to start without a signing secret");
    }
    if let Some(parent) = config
        .db_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let store = Store::new(&config.db_path)?;
    let state = Arc::new(AppState {
        db: DbHandle::new(store),
        keys: TokenKeys::new(&config.jwt_secret, config.token_ttl_days),
        strict_transitions: config.strict_transitions,
    });

    let mut app = build_router(state, Duration::from_secs(config.request_timeout_secs));
    if config.dev_mode {
        // Front-end dev servers run on another origin.
        app = app.layer(CorsLayer::permissive());
        tracing::warn!("dev mode: permissive CORS enabled");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        db = %config.db_path.display(),
        strict = config.strict_transitions,
        "gearguard API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
