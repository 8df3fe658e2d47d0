//! # huddle-server
//!
//! Real-time messaging hub.
//!
//! This binary provides:
//! - **WebSocket endpoint** (`/ws`) authenticated with an HS256 JWT; each
//!   connection gets a read pump and a write pump attached to the hub
//! - **Hub actor** that owns the connection registry and the room cache,
//!   and fans envelopes out to rooms, single users or everyone
//! - **REST API** (axum) for rooms, messages, read receipts, pins and
//!   notifications
//! - **SQLite persistence** through `huddle-store`

mod api;
mod auth;
mod config;
mod connection;
mod error;
mod hub;
mod service;
mod ws;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use huddle_store::{Database, SharedDatabase};

use crate::api::AppState;
use crate::auth::JwtValidator;
use crate::config::ServerConfig;
use crate::hub::HubHandle;
use crate::service::{MessagingService, PageLimits};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,huddle_server=debug,huddle_store=info")),
        )
        .init();

    info!("Starting Huddle server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open storage
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    info!(path = ?db.path(), "Database ready");
    let repo = Arc::new(SharedDatabase::new(db));

    // -----------------------------------------------------------------------
    // 4. Spawn the hub and build the messaging service
    // -----------------------------------------------------------------------
    let hub = HubHandle::new(
        config.hub_queue_capacity,
        config.outbound_queue_capacity,
        config.write_timeout,
    );

    let service = MessagingService::new(
        repo,
        hub,
        config.room_lookup,
        PageLimits {
            default: config.history_default_limit,
            max: config.history_max_limit,
        },
    );

    let app_state = AppState {
        service: Arc::new(service),
        validator: Arc::new(JwtValidator::new(config.jwt_secret.as_bytes())),
    };

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
