//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format and `#[serde(default)]` so partial files only override the keys
//! they mention.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Default greeting sent to each client right after it connects.
pub const DEFAULT_WELCOME_MESSAGE: &str = "Welcome to the BroadCast!  ✅✅✅";

/// Routes the HTTP surface already owns. `/` is shared: it serves the UI
/// page and accepts upgrades.
const RESERVED_PATHS: [&str; 2] = ["/health", "/metrics"];

/// Characters axum reads as captures or wildcards.
const ROUTE_SYNTAX: [char; 3] = ['*', '{', '}'];

/// Root settings type for the relay.
///
/// ```json
/// {
///   "server": { "port": 9090, "staticDir": "web" },
///   "relay": { "maxMessageSize": 4096 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Network and HTTP surface.
    pub server: ServerSettings,
    /// Broadcast behavior.
    pub relay: BroadcastSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "wsPath must start with '/': {}",
                self.server.ws_path
            )));
        }
        if self.server.ws_path.contains(ROUTE_SYNTAX) {
            return Err(SettingsError::InvalidValue(format!(
                "wsPath must be a literal path: {}",
                self.server.ws_path
            )));
        }
        if RESERVED_PATHS.contains(&self.server.ws_path.as_str()) {
            return Err(SettingsError::InvalidValue(format!(
                "wsPath collides with a built-in route: {}",
                self.server.ws_path
            )));
        }
        if self.relay.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "maxMessageSize must be positive".into(),
            ));
        }
        if self.relay.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "sendQueueCapacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port for HTTP and WebSocket traffic (`0` picks a free port).
    pub port: u16,
    /// Path of the WebSocket endpoint. Upgrades on `/` are always accepted.
    pub ws_path: String,
    /// Directory holding the prebuilt web UI bundle.
    pub static_dir: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ws_path: "/".to_string(),
            static_dir: "public".to_string(),
        }
    }
}

/// Broadcast relay settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BroadcastSettings {
    /// Text of the envelope sent to a client when it connects.
    pub welcome_message: String,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per client before deliveries are dropped.
    pub send_queue_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive (`RUST_LOG` takes precedence).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
