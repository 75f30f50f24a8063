//! WebSocket client connection state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Unique connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport readiness, ordered so transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ReadyState {
    /// Accepted, not yet registered.
    Connecting = 0,
    /// Registered and writable.
    Open = 1,
    /// Close initiated by either side.
    Closing = 2,
    /// Transport gone.
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Result of handing one frame to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Frame queued for the writer task.
    Sent,
    /// Connection is not `Open`; nothing was queued.
    NotOpen,
    /// Outbound queue is full; this frame was dropped.
    QueueFull,
    /// Writer task has gone away; the connection is now `Closed`.
    Closed,
}

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    state: AtomicU8,
    /// When this connection was accepted.
    pub connected_at: Instant,
    /// Count of frames dropped because the queue was full.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection in the `Connecting` state.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            state: AtomicU8::new(ReadyState::Connecting as u8),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create a connection plus the receiving end of its outbound queue.
    pub fn channel(
        id: ConnectionId,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(id, tx)), rx)
    }

    /// Current readiness state.
    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether frames can be queued right now.
    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Move to `next` unless the connection is already further along.
    ///
    /// Returns the state after the call.
    pub fn advance(&self, next: ReadyState) -> ReadyState {
        let prev = self.state.fetch_max(next as u8, Ordering::AcqRel);
        ReadyState::from_u8(prev.max(next as u8))
    }

    /// Mark the connection writable.
    pub fn mark_open(&self) -> ReadyState {
        self.advance(ReadyState::Open)
    }

    /// Mark that a close has started.
    pub fn mark_closing(&self) -> ReadyState {
        self.advance(ReadyState::Closing)
    }

    /// Mark the transport as gone.
    pub fn mark_closed(&self) -> ReadyState {
        self.advance(ReadyState::Closed)
    }

    /// Queue a text frame without waiting.
    ///
    /// Never blocks: a full queue drops the frame, a dead writer flips the
    /// connection to `Closed`.
    pub fn send(&self, frame: Arc<String>) -> Delivery {
        if !self.is_open() {
            return Delivery::NotOpen;
        }
        self.enqueue(frame)
    }

    /// Queue a frame regardless of readiness.
    ///
    /// Used for the welcome while the connection is still `Connecting`, so
    /// it lands ahead of any broadcast.
    pub fn enqueue(&self, frame: Arc<String>) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Delivery::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                let _ = self.mark_closed();
                Delivery::Closed
            }
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("state", &self.ready_state())
            .field("dropped", &self.drop_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_connection(capacity: usize) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (conn, rx) = ClientConnection::channel("conn_1".into(), capacity);
        let _ = conn.mark_open();
        (conn, rx)
    }

    #[test]
    fn new_connection_is_connecting() {
        let (conn, _rx) = ClientConnection::channel("c".into(), 4);
        assert_eq!(conn.ready_state(), ReadyState::Connecting);
        assert!(!conn.is_open());
    }

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("conn_"));
        assert_eq!(a.to_string(), a.as_str());
    }

    #[test]
    fn state_transitions_are_monotonic() {
        let (conn, _rx) = ClientConnection::channel("c".into(), 4);
        assert_eq!(conn.mark_open(), ReadyState::Open);
        assert_eq!(conn.mark_closed(), ReadyState::Closed);
        // No way back.
        assert_eq!(conn.mark_open(), ReadyState::Closed);
        assert_eq!(conn.mark_closing(), ReadyState::Closed);
        assert_eq!(conn.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn send_when_open() {
        let (conn, mut rx) = open_connection(4);
        assert_eq!(conn.send(Arc::new("hello".into())), Delivery::Sent);
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn send_before_open_is_skipped() {
        let (conn, mut rx) = ClientConnection::channel("c".into(), 4);
        assert_eq!(conn.send(Arc::new("early".into())), Delivery::NotOpen);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn enqueue_ignores_readiness() {
        let (conn, mut rx) = ClientConnection::channel("c".into(), 4);
        assert_eq!(conn.enqueue(Arc::new("welcome".into())), Delivery::Sent);
        assert_eq!(conn.ready_state(), ReadyState::Connecting);
        assert_eq!(&*rx.try_recv().unwrap(), "welcome");
    }

    #[test]
    fn send_while_closing_is_skipped() {
        let (conn, mut rx) = open_connection(4);
        let _ = conn.mark_closing();
        assert_eq!(conn.send(Arc::new("late".into())), Delivery::NotOpen);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_to_full_queue_drops() {
        let (conn, _rx) = open_connection(1);
        assert_eq!(conn.send(Arc::new("1".into())), Delivery::Sent);
        assert_eq!(conn.send(Arc::new("2".into())), Delivery::QueueFull);
        assert_eq!(conn.drop_count(), 1);
        // Still open: a slow reader is not evicted.
        assert!(conn.is_open());
    }

    #[test]
    fn send_after_writer_gone_closes() {
        let (conn, rx) = open_connection(4);
        drop(rx);
        assert_eq!(conn.send(Arc::new("x".into())), Delivery::Closed);
        assert_eq!(conn.ready_state(), ReadyState::Closed);
        assert_eq!(conn.send(Arc::new("y".into())), Delivery::NotOpen);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (conn, _rx) = ClientConnection::channel("c".into(), 0);
        let _ = conn.mark_open();
        assert_eq!(conn.send(Arc::new("x".into())), Delivery::Sent);
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = ClientConnection::channel("c".into(), 1);
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.age() > age1);
    }
}
