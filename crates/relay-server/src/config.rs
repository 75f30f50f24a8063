//! Server configuration.

use std::path::PathBuf;

use relay_settings::{BroadcastSettings, RelaySettings};

/// Runtime configuration for the relay server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
    /// Root of the static web UI; `/` serves `dist/index.html` below it.
    pub static_dir: PathBuf,
    /// Text of the welcome envelope.
    pub welcome_message: String,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-client outbound queue depth.
    pub send_queue_capacity: usize,
}

impl ServerConfig {
    /// Address string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Path of the UI entry page.
    pub fn index_file(&self) -> PathBuf {
        self.static_dir.join("dist").join("index.html")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let relay = BroadcastSettings::default();
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ws_path: "/".into(),
            static_dir: PathBuf::from("public"),
            welcome_message: relay.welcome_message,
            max_message_size: relay.max_message_size,
            send_queue_capacity: relay.send_queue_capacity,
        }
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            ws_path: settings.server.ws_path.clone(),
            static_dir: PathBuf::from(&settings.server.static_dir),
            welcome_message: settings.relay.welcome_message.clone(),
            max_message_size: settings.relay.max_message_size,
            send_queue_capacity: settings.relay.send_queue_capacity,
        }
    }
}
