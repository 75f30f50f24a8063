//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

use super::connection::{ClientConnection, ConnectionId};
use super::relay::BroadcastRelay;

/// How long the writer gets to flush queued frames and the close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection and queues the welcome envelope
/// 2. Relays every text or binary frame to all open clients
/// 3. Forwards queued frames to the socket from a writer task
/// 4. Unregisters on close, transport error, or server shutdown
#[instrument(skip_all, fields(conn_id = %connection_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    relay: Arc<BroadcastRelay>,
    send_queue_capacity: usize,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (connection, send_rx) = ClientConnection::channel(connection_id, send_queue_capacity);

    let connection_start = Instant::now();
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let close = CancellationToken::new();
    let mut outbound = tokio::spawn(forward_outbound(
        ws_tx,
        send_rx,
        connection.clone(),
        close.clone(),
    ));

    // Registered before the first inbound frame is read.
    let _ = relay.on_connect(&connection);

    loop {
        let next = tokio::select! {
            msg = ws_rx.next() => msg,
            () = shutdown.cancelled() => {
                let _ = connection.mark_closing();
                info!("server shutting down, closing client");
                break;
            }
        };

        match next {
            Some(Ok(msg)) => match decode_frame(&msg) {
                Frame::Payload(text) => {
                    let _ = relay.on_message(&connection, &text);
                }
                Frame::Close => {
                    let _ = connection.mark_closing();
                    debug!("client sent close frame");
                    break;
                }
                Frame::Control => {}
            },
            Some(Err(e)) => {
                let _ = relay.on_error(&connection, &e);
                break;
            }
            None => {
                debug!("client stream ended");
                break;
            }
        }
    }

    let _ = relay.on_close(&connection);
    close.cancel();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut outbound)
        .await
        .is_err()
    {
        outbound.abort();
    }

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}

/// Drain the outbound queue into the socket until closed or failed.
async fn forward_outbound<S>(
    mut ws_tx: S,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    close: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            biased;
            frame = send_rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = ws_tx.send(Message::Text(frame.as_str().into())).await {
                    debug!(conn_id = %connection.id, error = %e, "write failed, stopping writer");
                    break;
                }
            }
            () = close.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
    let _ = connection.mark_closed();
}

/// Inbound frame classified for the relay.
#[derive(Debug, PartialEq, Eq)]
enum Frame<'a> {
    /// Text to relay.
    Payload(Cow<'a, str>),
    /// Peer initiated close.
    Close,
    /// Ping/Pong, answered by the transport.
    Control,
}

/// Text frames pass through; binary frames are read as UTF-8, replacing
/// invalid sequences.
fn decode_frame(msg: &Message) -> Frame<'_> {
    match msg {
        Message::Text(text) => Frame::Payload(Cow::Borrowed(text.as_str())),
        Message::Binary(data) => Frame::Payload(String::from_utf8_lossy(data)),
        Message::Close(_) => Frame::Close,
        Message::Ping(_) | Message::Pong(_) => Frame::Control,
    }
}
