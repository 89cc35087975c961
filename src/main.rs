//! Application entry point for the `fleetcore` service.
//!
//! This binary orchestrates the startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Connecting the primary PostgreSQL store, or starting on fallback data
//! - Mounting all API routes via the `routes` gateway (EMBP)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (optional) – PostgreSQL connection string; unset starts degraded
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `STORE_TIMEOUT_MS` (optional) – per-call store timeout (default: 5000)
//! - `STORE_REPROBE` (optional) – `never`, `next_call` or seconds (default: never)
//! - `LISTEN_ADDR` (optional) – bind address (default: 0.0.0.0:8080)
//! - `FLEET_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `FLEET_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, io::IsTerminal, sync::Arc};

use axum::Router;
use dotenvy::dotenv;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

use fleetcore::store::PgConnector;
use fleetcore::{config, routes, Fleet, StoreHandle};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let store = match &cfg.db_url {
        Some(db_url) => {
            tracing::info!("Attempting to connect to primary store");
            let connector = PgConnector {
                db_url: db_url.clone(),
                pool_max: cfg.db_pool_max,
                connect_timeout: cfg.store_timeout,
            };
            StoreHandle::connect(Arc::new(connector), cfg.store_reprobe, cfg.store_timeout).await
        }
        None => StoreHandle::fallback_only().await,
    };
    tracing::info!("Store mode at startup: {:?}", store.mode().await);

    let fleet = Arc::new(Fleet::new(Arc::new(store)));

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(fleet);

    tracing::info!("Listening on {}", cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// - Color output: `FORCE_COLOR=1|true|yes` forces it on, `0|false|no` off,
///   anything else auto-detects a TTY
/// - Span events via `FLEET_SPAN_EVENTS`: `"full"`, `"enter_exit"`, or
///   CLOSE only by default
/// - Level: `RUST_LOG` when set, otherwise `FLEET_LOG_LEVEL` (default `debug`)
///
/// Call once at startup, before any tracing macros run.
fn init_tracing() {
    // ---
    let span_events = match env::var("FLEET_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("FLEET_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
