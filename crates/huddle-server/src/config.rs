//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use huddle_shared::constants::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_HTTP_PORT, DEFAULT_HUB_QUEUE, DEFAULT_OUTBOUND_QUEUE,
    MAX_HISTORY_LIMIT,
};

/// Secret used when `JWT_SECRET` is unset. Development only.
const DEV_JWT_SECRET: &str = "dev-secret";

/// How the messaging service resolves a room id that is not in the hub cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomLookup {
    /// Fall back to storage and mirror the room into the cache.
    ReadThrough,
    /// Only rooms already cached are visible.
    CacheOnly,
}

impl FromStr for RoomLookup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read_through" | "read-through" => Ok(RoomLookup::ReadThrough),
            "cache_only" | "cache-only" => Ok(RoomLookup::CacheOnly),
            other => Err(format!("unknown room lookup policy: {}", other)),
        }
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: platform data directory (`huddle.db`).
    pub database_path: Option<PathBuf>,

    /// HS256 key used to validate client tokens.
    /// Env: `JWT_SECRET`
    /// Default: `dev-secret` (development only).
    pub jwt_secret: String,

    /// Capacity of each connection's outbound queue. A connection whose
    /// queue is full when the hub delivers to it is disconnected.
    /// Env: `OUTBOUND_QUEUE_CAPACITY`
    /// Default: `256`
    pub outbound_queue_capacity: usize,

    /// Capacity of the hub command queue.
    /// Env: `HUB_QUEUE_CAPACITY`
    /// Default: `1024`
    pub hub_queue_capacity: usize,

    /// Deadline for writing one frame to a client.
    /// Env: `WRITE_TIMEOUT_SECS`
    /// Default: `10`
    pub write_timeout: Duration,

    /// Env: `ROOM_LOOKUP` (`read_through` / `cache_only`)
    /// Default: `read_through`
    pub room_lookup: RoomLookup,

    /// Page size used when a history request asks for 0 messages.
    /// Env: `HISTORY_DEFAULT_LIMIT`
    /// Default: `50`
    pub history_default_limit: u32,

    /// Upper bound for a history page.
    /// Env: `HISTORY_MAX_LIMIT`
    /// Default: `200`
    pub history_max_limit: u32,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"<redacted>")
            .field("outbound_queue_capacity", &self.outbound_queue_capacity)
            .field("hub_queue_capacity", &self.hub_queue_capacity)
            .field("write_timeout", &self.write_timeout)
            .field("room_lookup", &self.room_lookup)
            .field("history_default_limit", &self.history_default_limit)
            .field("history_max_limit", &self.history_max_limit)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE,
            hub_queue_capacity: DEFAULT_HUB_QUEUE,
            write_timeout: Duration::from_secs(10),
            room_lookup: RoomLookup::ReadThrough,
            history_default_limit: DEFAULT_HISTORY_LIMIT,
            history_max_limit: MAX_HISTORY_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Invalid values are
    /// logged and replaced by their default.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = get("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = get("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        match get("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => config.jwt_secret = secret,
            None => tracing::warn!("JWT_SECRET not set, using development secret"),
        }

        parse_positive(&get, "OUTBOUND_QUEUE_CAPACITY", &mut config.outbound_queue_capacity);
        parse_positive(&get, "HUB_QUEUE_CAPACITY", &mut config.hub_queue_capacity);

        let mut write_timeout_secs = config.write_timeout.as_secs();
        parse_positive(&get, "WRITE_TIMEOUT_SECS", &mut write_timeout_secs);
        config.write_timeout = Duration::from_secs(write_timeout_secs);

        if let Some(val) = get("ROOM_LOOKUP") {
            match val.parse() {
                Ok(policy) => config.room_lookup = policy,
                Err(e) => tracing::warn!(error = %e, "Invalid ROOM_LOOKUP, using default"),
            }
        }

        parse_positive(&get, "HISTORY_DEFAULT_LIMIT", &mut config.history_default_limit);
        parse_positive(&get, "HISTORY_MAX_LIMIT", &mut config.history_max_limit);
        if config.history_default_limit > config.history_max_limit {
            config.history_default_limit = config.history_max_limit;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

/// Overwrite `slot` with the parsed variable if it is a positive integer.
fn parse_positive<T>(get: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr + PartialOrd + Default,
{
    let Some(val) = get(key) else {
        return;
    };
    match val.trim().parse::<T>() {
        Ok(n) if n > T::default() => *slot = n,
        _ => tracing::warn!(key, value = %val, "Invalid value, using default"),
    }
}
