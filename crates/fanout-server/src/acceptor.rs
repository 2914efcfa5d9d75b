//! Connection-acceptance endpoint.
//!
//! This module:
//! - Accepts TCP connections on the WebSocket port.
//! - Runs the HTTP upgrade for `GET /ws`, checking the token query
//!   parameter through the configured [`TokenValidator`].
//! - Assigns each connection a `ConnectionId` and a bounded outbound queue.
//! - Registers it with the hub and starts its reader/writer tasks.
//!
//! Origins are not checked: any `Origin` header is accepted and logged.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use fanout_core::ConnectionId;
use fanout_protocol::wire_types::WS_PATH;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, TokenValidator};
use crate::connection::{self, Connection, ConnectionSettings};
use crate::hub_task::HubHandle;
use crate::types::TrackedTasks;

/// Process-wide counter for assigning unique `ConnectionId`s.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Everything the endpoint needs to admit a peer.
pub struct WsEndpoint {
    pub hub: HubHandle,
    pub validator: Arc<dyn TokenValidator>,
    pub token_key: String,
    pub settings: ConnectionSettings,
    pub shutdown: CancellationToken,
    pub tasks: TrackedTasks,
}

impl WsEndpoint {
    fn ws_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.settings.max_message_size);
        config.max_frame_size = Some(self.settings.max_message_size);
        config.write_buffer_size = self.settings.write_buffer_size;
        config
    }
}

/// Accept loop. Returns `Ok(())` once `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, endpoint: Arc<WsEndpoint>) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "accepting websocket connections");

    loop {
        let accepted = tokio::select! {
            _ = endpoint.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                // Typically fd exhaustion; keep serving the peers we have.
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let per_conn = endpoint.clone();
        endpoint.tasks.spawn(accept_connection(stream, peer, per_conn));
    }

    info!("websocket listener stopped");
    Ok(())
}

/// Upgrade one TCP stream and hand it to the hub.
async fn accept_connection(stream: TcpStream, peer: SocketAddr, endpoint: Arc<WsEndpoint>) {
    let mut admitted: Option<Option<String>> = None;

    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() != WS_PATH {
            return Err(reject(StatusCode::NOT_FOUND, "not found"));
        }

        if let Some(origin) = req.headers().get("origin") {
            debug!(%peer, origin = ?origin, "upgrade request");
        }

        let token = query_param(req, &endpoint.token_key);
        match endpoint.validator.validate(token.as_deref()) {
            Ok(user_id) => {
                admitted = Some(user_id);
                Ok(response)
            }
            Err(e) => {
                info!(%peer, reason = %e, "rejecting connection");
                Err(reject(StatusCode::UNAUTHORIZED, unauthorized_body(&e)))
            }
        }
    };

    let handshake = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        callback,
        Some(endpoint.ws_config()),
    );

    // A peer that never finishes the upgrade must not hold the socket.
    let ws = tokio::select! {
        _ = endpoint.shutdown.cancelled() => {
            debug!(%peer, "shutdown during handshake");
            return;
        }
        res = timeout(endpoint.settings.handshake_timeout, handshake) => match res {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "websocket handshake failed");
                return;
            }
            Err(_) => {
                info!(%peer, timeout = ?endpoint.settings.handshake_timeout, "websocket handshake timed out");
                return;
            }
        },
    };

    let Some(user_id) = admitted else {
        return;
    };

    let conn = Connection {
        id: next_connection_id(),
        user_id,
        peer,
    };
    let (outbox, outbound) = mpsc::channel(endpoint.settings.queue_capacity);

    if endpoint
        .hub
        .register(conn.id, conn.user_id.clone(), outbox)
        .await
        .is_err()
    {
        debug!(%peer, "hub closed, dropping new connection");
        return;
    }

    info!(id = %conn.id, %peer, user_id = conn.user_id.as_deref().unwrap_or("-"), "connection registered");

    connection::spawn(
        conn,
        ws,
        outbound,
        endpoint.hub.clone(),
        endpoint.settings,
        &endpoint.shutdown,
        &endpoint.tasks,
    );
}

fn query_param(req: &Request, key: &str) -> Option<String> {
    let query = req.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn reject(status: StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_owned()));
    *response.status_mut() = status;
    response
}

fn unauthorized_body(err: &AuthError) -> &'static str {
    match err {
        AuthError::Missing => "missing token",
        AuthError::Invalid(_) => "invalid token",
    }
}
