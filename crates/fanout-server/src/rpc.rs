//! Notification RPC listener.
//!
//! Backend services connect over plain TCP and send one JSON request per
//! line (see `fanout_protocol::rpc_codec`). Each request gets one reply
//! line. A bad request is answered with an error reply and the session
//! continues; an over-long line or an I/O error ends the session.

use std::net::SocketAddr;

use anyhow::Result;
use fanout_protocol::wire_types::MAX_RPC_LINE;
use fanout_protocol::{decode_request, encode_reply, RoutedMessage, RpcReply};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::CallContext;
use crate::notify::{NotifyError, Notifier};
use crate::types::TrackedTasks;

/// Accept loop. Returns `Ok(())` once `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    notifier: Notifier,
    shutdown: CancellationToken,
    tasks: TrackedTasks,
) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "accepting notification rpc connections");

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "rpc accept failed");
                continue;
            }
        };

        tasks.spawn(run_session(stream, peer, notifier.clone(), shutdown.clone()));
    }

    info!("rpc listener stopped");
    Ok(())
}

async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    notifier: Notifier,
    shutdown: CancellationToken,
) {
    debug!(%peer, "rpc session opened");

    let (read_half, write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_RPC_LINE));
    let mut replies = FramedWrite::new(write_half, LinesCodec::new());

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = lines.next() => next,
        };

        let line = match next {
            None => break,
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                warn!(%peer, error = %e, "rpc read error");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let reply = handle_line(&notifier, peer, &line).await;
        if let Err(e) = replies.send(encode_reply(&reply)).await {
            debug!(%peer, error = %e, "rpc write error");
            break;
        }
    }

    debug!(%peer, "rpc session closed");
}

async fn handle_line(notifier: &Notifier, peer: SocketAddr, line: &str) -> RpcReply {
    let req = match decode_request(line) {
        Ok(req) => req,
        Err(e) => {
            warn!(%peer, error = %e, "bad rpc request");
            return RpcReply::error(e.to_string());
        }
    };

    let method = req.call.method();
    let ctx = CallContext {
        peer: Some(peer),
        token: req.token.as_deref(),
    };

    match notifier.dispatch(&ctx, RoutedMessage::from(req.call)).await {
        Ok(()) => {
            debug!(%peer, method, "rpc call accepted");
            RpcReply::ok()
        }
        Err(e @ NotifyError::Unauthenticated(_)) => {
            info!(%peer, method, reason = %e, "rpc call rejected");
            RpcReply::error(e.to_string())
        }
        Err(e) => {
            warn!(%peer, method, error = %e, "rpc call failed");
            RpcReply::error(e.to_string())
        }
    }
}
