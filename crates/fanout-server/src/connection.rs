//! Per-connection reader and writer tasks.
//!
//! A connection's WebSocket is split once, right after the handshake:
//! - the reader task owns the stream half and turns room requests into
//!   hub commands,
//! - the writer task owns the sink half and drains the connection's
//!   outbound queue, plus a periodic ping.
//!
//! The two only coordinate through the outbound queue (closed by the hub
//! on unregister) and a per-connection cancellation token (cancelled by
//! the writer when it stops, so the reader stops too).

use std::net::SocketAddr;
use std::time::Duration;

use fanout_core::{Action, ConnectionId, Payload};
use fanout_protocol::wire_types::MAX_FRAME_SIZE;
use fanout_protocol::{decode_inbound, Inbound};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub_task::HubHandle;
use crate::types::{HubClosed, TrackedTasks};

type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Payload of the server's liveness probe.
const PING_PAYLOAD: &[u8] = b"ping";

/// Timings and limits for one connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Outbound queue capacity; a full queue gets the connection evicted.
    pub queue_capacity: usize,

    /// Period of server pings. Must be less than `pong_wait`.
    pub ping_period: Duration,

    /// Time allowed between two inbound frames (pongs included).
    pub pong_wait: Duration,

    /// Time allowed for any single write.
    pub write_wait: Duration,

    /// Largest inbound message, in bytes.
    pub max_message_size: usize,

    /// WebSocket write buffer size, in bytes.
    pub write_buffer_size: usize,

    /// Time allowed for the HTTP upgrade, from TCP accept to handshake done.
    pub handshake_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            queue_capacity: 256,
            ping_period: Duration::from_secs(45),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            max_message_size: MAX_FRAME_SIZE,
            write_buffer_size: 1024,
            handshake_timeout: Duration::from_secs(3),
        }
    }
}

/// A freshly upgraded peer.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: Option<String>,
    pub peer: SocketAddr,
}

/// Split the socket and start the reader and writer tasks.
///
/// Returns immediately; the connection lives until both tasks exit.
pub fn spawn(
    conn: Connection,
    ws: WsStream,
    outbound: mpsc::Receiver<Payload>,
    hub: HubHandle,
    settings: ConnectionSettings,
    parent: &CancellationToken,
    tasks: &TrackedTasks,
) {
    let (sink, source) = ws.split();
    let token = parent.child_token();

    tasks.spawn(write_loop(conn.id, sink, outbound, settings, token.clone()));
    tasks.spawn(read_loop(conn, source, hub, settings, token));
}

// -----------------------------------------------------------------------------
// Reader
// -----------------------------------------------------------------------------

async fn read_loop(
    conn: Connection,
    mut source: WsSource,
    hub: HubHandle,
    settings: ConnectionSettings,
    token: CancellationToken,
) {
    let id = conn.id;
    let mut deadline = Instant::now() + settings.pong_wait;

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => {
                debug!(%id, "reader cancelled");
                break;
            }
            next = timeout_at(deadline, source.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                info!(%id, peer = %conn.peer, "liveness deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                log_read_error(id, &e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        deadline = Instant::now() + settings.pong_wait;

        match frame {
            Message::Text(text) => {
                if handle_text(id, &text, &hub).await.is_err() {
                    debug!(%id, "hub closed, reader exiting");
                    break;
                }
            }
            Message::Close(_) => break,
            // Pongs only refresh the deadline; pings are answered by tungstenite.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) | Message::Frame(_) => {
                debug!(%id, "ignoring non-text frame");
            }
        }
    }

    // Whatever ended the loop, the hub must forget this connection.
    let _ = hub.unregister(id).await;
    info!(%id, peer = %conn.peer, "connection closed");
}

async fn handle_text(id: ConnectionId, text: &str, hub: &HubHandle) -> Result<(), HubClosed> {
    match decode_inbound(text) {
        Ok(Inbound::KeepAlive) => Ok(()),
        Ok(Inbound::Subscription(sub)) => match sub.action {
            Action::Enter => hub.subscribe(sub.room, id).await,
            Action::Leave => hub.unsubscribe(sub.room, id).await,
        },
        Err(e) => {
            warn!(%id, error = %e, "ignoring inbound frame");
            Ok(())
        }
    }
}

fn log_read_error(id: ConnectionId, err: &tungstenite::Error) {
    match err {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ) => debug!(%id, "peer went away"),
        other => warn!(%id, error = %other, "read error"),
    }
}

// -----------------------------------------------------------------------------
// Writer
// -----------------------------------------------------------------------------

async fn write_loop(
    id: ConnectionId,
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<Payload>,
    settings: ConnectionSettings,
    token: CancellationToken,
) {
    let mut ping = interval_at(Instant::now() + settings.ping_period, settings.ping_period);

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(first) = next else {
                    // The hub closed the queue.
                    let _ = timeout(settings.write_wait, sink.send(Message::Close(None))).await;
                    break;
                };

                let batch = write_batch(&mut sink, &mut outbound, first, settings.queue_capacity);
                match timeout(settings.write_wait, batch).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(%id, error = %e, "write failed");
                        break;
                    }
                    Err(_) => {
                        warn!(%id, "write deadline exceeded");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                let probe = sink.send(Message::Ping(PING_PAYLOAD.to_vec()));
                if !matches!(timeout(settings.write_wait, probe).await, Ok(Ok(()))) {
                    debug!(%id, "ping failed");
                    let _ = timeout(settings.write_wait, sink.close()).await;
                    break;
                }
            }
        }
    }

    token.cancel();
    debug!(%id, "writer stopped");
}

/// Write `first` plus whatever is already queued, flushing once.
///
/// Never waits for new arrivals; at most `limit` extra items are taken
/// so a busy queue cannot keep one write going forever.
async fn write_batch(
    sink: &mut WsSink,
    outbound: &mut mpsc::Receiver<Payload>,
    first: Payload,
    limit: usize,
) -> Result<(), tungstenite::Error> {
    sink.feed(Message::Text(first.to_string())).await?;

    let mut extra = 0;
    while extra < limit {
        match outbound.try_recv() {
            Ok(next) => {
                sink.feed(Message::Text(next.to_string())).await?;
                extra += 1;
            }
            Err(_) => break,
        }
    }

    sink.flush().await
}
