// crates/fanout-server/tests/ws_scenarios.rs
mod common;

use std::time::Duration;

use common::{assert_silent, next_text, start, start_with, Peer, DENIED};
use fanout_core::Message;
use fanout_server::{CallContext, ConnectionSettings, Extensions};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

async fn send_text(peer: &mut Peer, text: &str) {
    peer.send(WsMessage::Text(text.to_string())).await.unwrap();
}

#[tokio::test]
async fn room_broadcast_reaches_members_only() {
    let server = start().await;
    let mut a = server.connect(None).await;
    let mut b = server.connect(None).await;
    server.wait_for_connections(2).await;

    send_text(&mut a, r#"{"action":"enter","room":"r1"}"#).await;
    server.wait_for_room("r1", 1).await;

    server
        .notifier
        .notify_room(&CallContext::local(), Message::info("e1", "to the room"), "r1")
        .await
        .unwrap();

    let got = next_text(&mut a).await;
    assert_eq!(got, r#"{"type":"info","entityId":"e1","message":"to the room"}"#);
    assert_silent(&mut b, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn leaving_a_room_stops_delivery_and_prunes_it() {
    let server = start().await;
    let mut a = server.connect(None).await;
    server.wait_for_connections(1).await;

    send_text(&mut a, r#"{"action":"enter","room":"2023-01-01"}"#).await;
    server.wait_for_room("2023-01-01", 1).await;
    send_text(&mut a, r#"{"action":"leave","room":"2023-01-01"}"#).await;
    server.wait_for_room("2023-01-01", 0).await;
    assert_eq!(server.hub.stats().await.unwrap().rooms, 0);

    server
        .notifier
        .notify_room(&CallContext::local(), Message::info("e1", "anyone?"), "2023-01-01")
        .await
        .unwrap();
    assert_silent(&mut a, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn private_notify_reaches_identity() {
    let server = start().await;
    let mut a = server.connect(Some("u1")).await;
    let mut b = server.connect(Some("u2")).await;
    server.wait_for_user("u1").await;
    server.wait_for_user("u2").await;

    server
        .notifier
        .private_notify(&CallContext::local(), Message::info("e1", "hi"), "u1")
        .await
        .unwrap();

    assert_eq!(
        next_text(&mut a).await,
        r#"{"type":"info","entityId":"e1","message":"hi"}"#
    );
    assert_silent(&mut b, Duration::from_millis(300)).await;

    // Unknown identity: accepted by the façade, delivered to nobody.
    server
        .notifier
        .private_notify(&CallContext::local(), Message::info("e2", "lost"), "nobody")
        .await
        .unwrap();
    assert_silent(&mut a, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn broadcast_reaches_every_peer() {
    let server = start().await;
    let mut a = server.connect(None).await;
    let mut b = server.connect(Some("u2")).await;
    server.wait_for_connections(2).await;

    server
        .notifier
        .broadcast(&CallContext::local(), Message::error("e5", serde_json::json!({"n": 1})))
        .await
        .unwrap();

    let expected = r#"{"type":"error","entityId":"e5","message":{"n":1}}"#;
    assert_eq!(next_text(&mut a).await, expected);
    assert_eq!(next_text(&mut b).await, expected);
}

#[tokio::test]
async fn invalid_frames_neither_disconnect_nor_touch_rooms() {
    let server = start().await;
    let mut a = server.connect(None).await;
    server.wait_for_connections(1).await;

    send_text(&mut a, r#"{"action": ""#).await;
    send_text(&mut a, r#"{"action": "enter"}"#).await;
    send_text(&mut a, r#"{"action": "fly", "room": "2023-06-08"}"#).await;
    send_text(&mut a, "0").await;
    a.send(WsMessage::Binary(vec![1, 2, 3])).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let stats = server.hub.stats().await.unwrap();
    assert_eq!(stats.rooms, 0);
    assert_eq!(stats.connections, 1);

    // Still alive and still processed in order.
    send_text(&mut a, r#"{"action": "enter", "room": "2023-06-08"}"#).await;
    server.wait_for_room("2023-06-08", 1).await;
}

#[tokio::test]
async fn oversized_frame_ends_connection() {
    let server = start().await;
    let mut a = server.connect(None).await;
    server.wait_for_connections(1).await;

    let room = "x".repeat(600);
    let _ = a
        .send(WsMessage::Text(format!(r#"{{"action":"enter","room":"{room}"}}"#)))
        .await;

    server.wait_for_connections(0).await;
    assert_eq!(server.hub.stats().await.unwrap().rooms, 0);
}

#[tokio::test]
async fn peer_close_unregisters() {
    let server = start().await;
    let mut a = server.connect(Some("u1")).await;
    server.wait_for_user("u1").await;

    send_text(&mut a, r#"{"action":"enter","room":"r1"}"#).await;
    server.wait_for_room("r1", 1).await;

    a.close(None).await.unwrap();
    server.wait_for_connections(0).await;

    assert_eq!(server.hub.lookup_user("u1").await.unwrap(), None);
    assert!(server.hub.room_members("r1").await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_token_gets_401() {
    let server = start().await;
    let url = format!("{}?{}={}", server.ws_url, common::TOKEN_KEY, DENIED);

    match connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::UNAUTHORIZED),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("denied token was admitted"),
    }
    assert_eq!(server.hub.stats().await.unwrap().connections, 0);
}

#[tokio::test]
async fn unknown_path_gets_404() {
    let server = start().await;
    let url = server.ws_url.replace("/ws", "/elsewhere");

    match connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::NOT_FOUND),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("wrong path was upgraded"),
    }
}

#[tokio::test]
async fn silent_peer_is_dropped_after_pong_wait() {
    let settings = ConnectionSettings {
        ping_period: Duration::from_millis(100),
        pong_wait: Duration::from_millis(300),
        ..ConnectionSettings::default()
    };
    let server = start_with(Extensions::default(), settings).await;

    // Never polled, so it never answers pings.
    let _idle = server.connect(None).await;
    server.wait_for_connections(1).await;

    server.wait_for_connections(0).await;
}

#[tokio::test]
async fn responsive_peer_survives_pings() {
    let settings = ConnectionSettings {
        ping_period: Duration::from_millis(100),
        pong_wait: Duration::from_millis(300),
        ..ConnectionSettings::default()
    };
    let server = start_with(Extensions::default(), settings).await;

    let mut peer = server.connect(None).await;
    server.wait_for_connections(1).await;

    // Reading lets the client answer pings.
    let mut pings = 0;
    let _ = timeout(Duration::from_millis(800), async {
        while let Some(Ok(frame)) = peer.next().await {
            if matches!(frame, WsMessage::Ping(_)) {
                pings += 1;
            }
        }
    })
    .await;

    assert!(pings >= 2, "expected periodic pings, saw {pings}");
    assert_eq!(server.hub.stats().await.unwrap().connections, 1);
}

#[tokio::test]
async fn queued_messages_arrive_in_order() {
    let server = start().await;
    let mut a = server.connect(Some("u1")).await;
    server.wait_for_user("u1").await;

    for i in 0..20 {
        server
            .notifier
            .private_notify(&CallContext::local(), Message::info(format!("e{i}"), i), "u1")
            .await
            .unwrap();
    }

    for i in 0..20 {
        let frame: serde_json::Value = serde_json::from_str(&next_text(&mut a).await).unwrap();
        assert_eq!(frame["entityId"], format!("e{i}"));
        assert_eq!(frame["message"], i);
    }
}

#[tokio::test]
async fn shutdown_closes_peers_and_stops_server() {
    let server = start().await;
    let mut a = server.connect(None).await;
    server.wait_for_connections(1).await;

    server.shutdown.cancel();

    let closed = timeout(Duration::from_secs(2), async {
        loop {
            match a.next().await {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "peer was not closed on shutdown");

    let result = timeout(Duration::from_secs(3), server.task).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
    assert!(server.hub.is_closed());
}

#[tokio::test]
async fn stalled_handshake_is_closed_after_timeout() {
    let settings = ConnectionSettings {
        handshake_timeout: Duration::from_millis(200),
        ..ConnectionSettings::default()
    };
    let server = start_with(Extensions::default(), settings).await;

    // TCP only, never an upgrade request.
    let mut raw = TcpStream::connect(server.ws_addr).await.unwrap();
    let mut buf = [0u8; 64];
    let read = timeout(Duration::from_secs(2), raw.read(&mut buf))
        .await
        .expect("server kept the silent socket open");
    assert!(matches!(read, Ok(0) | Err(_)), "unexpected bytes: {read:?}");

    // The listener is still serving.
    let _peer = server.connect(None).await;
    server.wait_for_connections(1).await;
}

#[tokio::test]
async fn stalled_handshake_does_not_hold_up_shutdown() {
    // Default 3s handshake timeout, longer than the 2s test grace period.
    let server = start().await;

    let mut raw = TcpStream::connect(server.ws_addr).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    server.shutdown.cancel();
    let result = timeout(Duration::from_secs(3), server.task).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "shutdown waited {:?} on a silent socket",
        started.elapsed()
    );

    let mut buf = [0u8; 64];
    let read = timeout(Duration::from_secs(1), raw.read(&mut buf))
        .await
        .expect("socket still open after shutdown");
    assert!(matches!(read, Ok(0) | Err(_)));
}
