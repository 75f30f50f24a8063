//! # relay
//!
//! Broadcast relay binary: loads settings, starts the HTTP/WebSocket
//! server, and runs until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;
use relay_settings::RelaySettings;

/// WebSocket broadcast relay.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "WebSocket broadcast relay")]
struct Cli {
    /// Settings file (defaults to `$RELAY_CONFIG` or `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding the web UI bundle.
    #[arg(long)]
    static_dir: Option<String>,

    /// Default log filter (`RUST_LOG` takes precedence).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Flags win over the file and the environment.
    fn apply(self, settings: &mut RelaySettings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = self.static_dir {
            settings.server.static_dir = dir;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
    }
}

fn load(cli: Cli) -> Result<RelaySettings> {
    let path = cli.config.clone().unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = load(Cli::parse())?;
    relay_server::logging::init_subscriber(&settings.logging.level);

    let metrics_handle = relay_server::metrics::install_recorder()?;
    let config = ServerConfig::from(&settings);
    let server = RelayServer::new(config, metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to start server")?;

    tracing::info!(
        http = %format!("http://{addr}"),
        ws = %format!("ws://{addr}{}", server.config().ws_path),
        "relay ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    server.shutdown().graceful_shutdown(vec![handle], None).await;
    Ok(())
}
