//! envmon-daemon entry point.
//!
//! Sets up tracing, loads config, builds the shared state, wires middleware,
//! and starts the HTTP server. Handlers live in `routes.rs`; shared state in
//! `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use envmon_config::{
    load_layered_yaml, report_unused_keys, ConfigSurface, DeskSettings, UnusedKeyPolicy,
};
use envmon_daemon::{routes, state};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let settings = load_settings()?;
    if settings.users.is_empty() {
        warn!("user directory is empty; every request needing an actor will be refused");
    }

    let shared = Arc::new(state::AppState::from_settings(&settings)?);

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or(settings.bind_addr);
    info!(users = settings.users.len(), "envmon-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    info!("envmon-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `ENVMON_CONFIG` is a comma-separated list of YAML layers, base first.
fn load_settings() -> anyhow::Result<DeskSettings> {
    let Ok(raw) = std::env::var("ENVMON_CONFIG") else {
        info!("ENVMON_CONFIG not set; using defaults");
        return Ok(DeskSettings::default());
    };
    let paths: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let loaded = load_layered_yaml(&paths)?;
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");

    let report = report_unused_keys(
        ConfigSurface::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    for ptr in &report.unused_leaf_pointers {
        warn!(pointer = %ptr, "unused config key");
    }

    DeskSettings::from_config_json(&loaded.config_json)
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("ENVMON_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; running until killed");
        std::future::pending::<()>().await;
    }
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(tower_http::cors::Any)
}
