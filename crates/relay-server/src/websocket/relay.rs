//! Broadcast relay: welcome on connect, fan-out on message, cleanup on
//! close or error.

use std::fmt::Display;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use crate::envelope::Envelope;
use crate::metrics::{
    RELAY_BROADCASTS_TOTAL, RELAY_DELIVERIES_TOTAL, RELAY_MESSAGES_RECEIVED_TOTAL,
    WS_BROADCAST_DROPS_TOTAL, WS_ERRORS_TOTAL,
};

use super::connection::{ClientConnection, Delivery};
use super::registry::ConnectionRegistry;

/// Per-broadcast delivery tally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Registry members in the snapshot.
    pub recipients: usize,
    /// Frames queued.
    pub delivered: usize,
    /// Members skipped because they were not open.
    pub skipped: usize,
    /// Frames dropped on full queues.
    pub dropped: usize,
}

/// Relay protocol layered over a [`ConnectionRegistry`].
pub struct BroadcastRelay {
    registry: Arc<ConnectionRegistry>,
    welcome_message: String,
}

impl BroadcastRelay {
    /// Create a relay that greets new clients with `welcome_message`.
    pub fn new(registry: Arc<ConnectionRegistry>, welcome_message: impl Into<String>) -> Self {
        Self {
            registry,
            welcome_message: welcome_message.into(),
        }
    }

    /// The registry this relay fans out to.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Register `connection`, greet it alone, then open it to broadcasts.
    ///
    /// The welcome is queued while the connection is still `Connecting`, so
    /// broadcasters skip it until the welcome is first in its queue.
    pub fn on_connect(&self, connection: &Arc<ClientConnection>) -> Delivery {
        if !self.registry.add(connection.clone()) {
            warn!(conn_id = %connection.id, "connection already registered");
        }

        let delivery = match Envelope::now(self.welcome_message.as_str()).to_frame() {
            Ok(frame) => connection.enqueue(frame),
            Err(e) => {
                warn!(conn_id = %connection.id, error = %e, "failed to serialize welcome");
                Delivery::NotOpen
            }
        };
        let _ = connection.mark_open();
        info!(conn_id = %connection.id, connections = self.registry.len(), "client connected");
        delivery
    }

    /// Relay `payload` from `sender` to every open connection, sender included.
    pub fn on_message(&self, sender: &ClientConnection, payload: &str) -> BroadcastReport {
        counter!(RELAY_MESSAGES_RECEIVED_TOTAL).increment(1);
        debug!(conn_id = %sender.id, len = payload.len(), "received message");

        let frame = match Envelope::now(payload).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn_id = %sender.id, error = %e, "failed to serialize envelope");
                return BroadcastReport::default();
            }
        };
        self.broadcast_frame(&frame)
    }

    /// Queue one pre-serialized frame on every open registry member.
    pub fn broadcast_frame(&self, frame: &Arc<String>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        self.registry.for_each(|conn| {
            report.recipients += 1;
            match conn.send(Arc::clone(frame)) {
                Delivery::Sent => report.delivered += 1,
                Delivery::NotOpen | Delivery::Closed => {
                    report.skipped += 1;
                    debug!(conn_id = %conn.id, state = ?conn.ready_state(), "skipping non-writable client");
                }
                Delivery::QueueFull => {
                    report.dropped += 1;
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    warn!(conn_id = %conn.id, total_drops = conn.drop_count(), "failed to send to client (queue full)");
                }
            }
        });
        counter!(RELAY_BROADCASTS_TOTAL).increment(1);
        counter!(RELAY_DELIVERIES_TOTAL).increment(report.delivered as u64);
        debug!(
            recipients = report.recipients,
            delivered = report.delivered,
            skipped = report.skipped,
            dropped = report.dropped,
            "broadcast message"
        );
        report
    }

    /// Unregister `connection`. Returns `true` only for the call that removed it.
    pub fn on_close(&self, connection: &ClientConnection) -> bool {
        let _ = connection.mark_closed();
        let removed = self.registry.remove(&connection.id).is_some();
        if removed {
            info!(conn_id = %connection.id, connections = self.registry.len(), "client disconnected");
        }
        removed
    }

    /// Report a transport error and unregister the connection.
    ///
    /// A later `on_close` for the same connection is a no-op.
    pub fn on_error(&self, connection: &ClientConnection, err: &dyn Display) -> bool {
        counter!(WS_ERRORS_TOTAL).increment(1);
        warn!(conn_id = %connection.id, error = %err, "websocket error");
        self.on_close(connection)
    }
}
