// crates/fanout-server/tests/common/mod.rs
//
// Shared helpers: boot a server on ephemeral ports and drive peers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use fanout_server::{
    AllowAll, AuthError, Config, ConnectionSettings, Extensions, HubHandle, Notifier, Server,
    TokenValidator,
};
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub type Peer = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TOKEN_KEY: &str = "token";
pub const DENIED: &str = "deny";

/// Treats the token as the user id; `deny` is refused.
pub struct TokenIsUser;

impl TokenValidator for TokenIsUser {
    fn validate(&self, token: Option<&str>) -> Result<Option<String>, AuthError> {
        match token {
            Some(DENIED) => Err(AuthError::Invalid("denied".into())),
            Some(t) if !t.is_empty() => Ok(Some(t.to_string())),
            _ => Ok(None),
        }
    }
}

pub struct TestServer {
    pub ws_url: String,
    pub ws_addr: std::net::SocketAddr,
    pub rpc_addr: std::net::SocketAddr,
    pub hub: HubHandle,
    pub notifier: Notifier,
    pub shutdown: CancellationToken,
    pub task: JoinHandle<anyhow::Result<()>>,
}

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1".into(),
        rpc_port: 0,
        ws_port: 0,
        token_key: TOKEN_KEY.into(),
    }
}

pub async fn start() -> TestServer {
    start_with(
        Extensions {
            tokens: Arc::new(TokenIsUser),
            auth: Arc::new(AllowAll),
        },
        ConnectionSettings::default(),
    )
    .await
}

pub async fn start_with(extensions: Extensions, settings: ConnectionSettings) -> TestServer {
    let server = Server::bind(&test_config(), extensions, settings)
        .await
        .expect("bind")
        .with_grace(Duration::from_secs(2));

    let ws_addr = server.ws_addr().unwrap();
    let ws_url = format!("ws://{ws_addr}/ws");
    let rpc_addr = server.rpc_addr().unwrap();
    let hub = server.hub();
    let notifier = server.notifier();
    let shutdown = server.shutdown_token();
    let task = tokio::spawn(server.serve());

    TestServer {
        ws_url,
        ws_addr,
        rpc_addr,
        hub,
        notifier,
        shutdown,
        task,
    }
}

impl TestServer {
    pub async fn connect(&self, token: Option<&str>) -> Peer {
        let url = match token {
            Some(t) => format!("{}?{}={}", self.ws_url, TOKEN_KEY, t),
            None => self.ws_url.clone(),
        };
        let (peer, _) = connect_async(url).await.expect("connect");
        peer
    }

    pub async fn wait_for_connections(&self, n: usize) {
        let hub = self.hub.clone();
        eventually(|| {
            let hub = hub.clone();
            async move { hub.stats().await.map(|s| s.connections == n).unwrap_or(false) }
        })
        .await;
    }

    pub async fn wait_for_room(&self, room: &str, members: usize) {
        let hub = self.hub.clone();
        let room = room.to_string();
        eventually(|| {
            let hub = hub.clone();
            let room = room.clone();
            async move {
                hub.room_members(room)
                    .await
                    .map(|m| m.len() == members)
                    .unwrap_or(false)
            }
        })
        .await;
    }

    pub async fn wait_for_user(&self, user_id: &str) {
        let hub = self.hub.clone();
        let user_id = user_id.to_string();
        eventually(|| {
            let hub = hub.clone();
            let user_id = user_id.clone();
            async move { matches!(hub.lookup_user(user_id).await, Ok(Some(_))) }
        })
        .await;
    }
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

/// Next text frame, skipping control frames.
pub async fn next_text(peer: &mut Peer) -> String {
    let read = async {
        loop {
            match peer.next().await {
                Some(Ok(WsMessage::Text(text))) => return text,
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    };
    timeout(Duration::from_secs(2), read)
        .await
        .expect("no text frame within 2s")
}

/// Assert that no text frame shows up within `wait`.
pub async fn assert_silent(peer: &mut Peer, wait: Duration) {
    let read = async {
        loop {
            match peer.next().await {
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                other => return other,
            }
        }
    };
    if let Ok(frame) = timeout(wait, read).await {
        panic!("expected silence, got {frame:?}");
    }
}
