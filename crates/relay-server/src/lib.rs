//! # relay-server
//!
//! Axum HTTP + `WebSocket` broadcast relay.
//!
//! - `WebSocket` endpoint: every inbound message is wrapped in a timestamped
//!   envelope and fanned out to all open clients, sender included
//! - Connection registry with per-client bounded outbound queues
//! - HTTP endpoints: web UI entry page, static assets, health check, metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod envelope;
pub mod errors;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use envelope::Envelope;
pub use errors::{Result, ServerError};
pub use server::RelayServer;
pub use websocket::connection::{ClientConnection, ConnectionId, Delivery, ReadyState};
pub use websocket::registry::ConnectionRegistry;
pub use websocket::relay::{BroadcastRelay, BroadcastReport};
