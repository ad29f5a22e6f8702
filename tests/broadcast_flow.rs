//! End-to-end tests driving a real server over WebSocket and HTTP.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use broadcast_hub::app_state::AppState;
use broadcast_hub::config::{BroadcasterConfig, LogFormat};
use broadcast_hub::hub::{Hub, HubHandle};
use broadcast_hub::server;

const ALLOWED_ORIGIN: &str = "http://localhost";
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    hub: HubHandle,
}

async fn start_server() -> TestServer {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("cannot bind test listener");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("listener has no local address");
    };

    let config = BroadcasterConfig {
        hostname: addr.ip().to_string(),
        port: addr.port(),
        allowed_hosts: vec!["localhost".to_string()],
        index_path: PathBuf::from(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/static/index.html"
        )),
        log_format: LogFormat::Text,
    };
    let hub = Hub::spawn();
    let state = AppState::new(hub.clone(), &config);
    tokio::spawn(server::serve(listener, state, std::future::pending()));

    TestServer { addr, hub }
}

async fn connect(
    server: &TestServer,
    origin: Option<&'static str>,
) -> Result<Client, tungstenite::Error> {
    let mut request = format!("ws://{}/ws", server.addr).into_client_request()?;
    if let Some(origin) = origin {
        request
            .headers_mut()
            .insert(ORIGIN, HeaderValue::from_static(origin));
    }
    let (client, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(client)
}

async fn join(server: &TestServer) -> Client {
    tokio_test::assert_ok!(connect(server, Some(ALLOWED_ORIGIN)).await)
}

/// Waits until the hub reports `expected` members.
async fn wait_for_members(hub: &HubHandle, expected: usize) {
    for _ in 0..250 {
        if hub.member_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("hub never reached {expected} members");
}

/// Returns the next text frame, skipping control frames.
async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, client.next()).await;
        match frame {
            Ok(Some(Ok(Message::Text(text)))) => return text.as_str().to_string(),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

/// Waits for the server's close frame, skipping control frames.
async fn expect_close(client: &mut Client) {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, client.next()).await;
        match frame {
            Ok(Some(Ok(Message::Close(_)))) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            other => panic!("expected a close frame, got {other:?}"),
        }
    }
}

async fn send_text(client: &mut Client, text: &str) {
    tokio_test::assert_ok!(client.send(Message::text(text.to_string())).await);
}

#[tokio::test]
async fn broadcast_reaches_everyone_until_a_client_leaves() {
    let server = start_server().await;
    let mut a = join(&server).await;
    let mut b = join(&server).await;
    let mut c = join(&server).await;
    wait_for_members(&server.hub, 3).await;

    send_text(&mut a, "  hello\n").await;
    assert_eq!(next_text(&mut a).await, "hello");
    assert_eq!(next_text(&mut b).await, "hello");
    assert_eq!(next_text(&mut c).await, "hello");

    tokio_test::assert_ok!(b.close(None).await);
    wait_for_members(&server.hub, 2).await;

    send_text(&mut c, "world").await;
    assert_eq!(next_text(&mut a).await, "world");
    assert_eq!(next_text(&mut c).await, "world");
    assert_eq!(server.hub.member_count().await, 2);
}

#[tokio::test]
async fn severed_client_is_dropped_without_close_handshake() {
    let server = start_server().await;
    let mut a = join(&server).await;
    let b = join(&server).await;
    let mut c = join(&server).await;
    wait_for_members(&server.hub, 3).await;

    send_text(&mut a, "hello").await;
    assert_eq!(next_text(&mut a).await, "hello");
    assert_eq!(next_text(&mut c).await, "hello");

    // Dropping the stream closes the TCP connection with no close frame.
    drop(b);
    wait_for_members(&server.hub, 2).await;

    send_text(&mut c, "world").await;
    assert_eq!(next_text(&mut a).await, "world");
    assert_eq!(next_text(&mut c).await, "world");
    assert_eq!(server.hub.member_count().await, 2);
}

#[tokio::test]
async fn embedded_newlines_are_flattened() {
    let server = start_server().await;
    let mut a = join(&server).await;
    wait_for_members(&server.hub, 1).await;

    send_text(&mut a, "line one\nline two").await;
    assert_eq!(next_text(&mut a).await, "line one line two");
}

#[tokio::test]
async fn foreign_origin_is_refused() {
    let server = start_server().await;

    let result = connect(&server, Some("http://evil.example")).await;
    let Err(tungstenite::Error::Http(response)) = result else {
        panic!("upgrade from a foreign origin must fail with an HTTP error");
    };
    assert_eq!(response.status().as_u16(), 403);

    let missing = connect(&server, None).await;
    assert!(missing.is_err());
    assert_eq!(server.hub.member_count().await, 0);
}

#[tokio::test]
async fn message_size_boundary() {
    let server = start_server().await;
    let mut a = join(&server).await;
    wait_for_members(&server.hub, 1).await;

    let exact = "a".repeat(512);
    send_text(&mut a, &exact).await;
    assert_eq!(next_text(&mut a).await, exact);

    let oversized = "a".repeat(513);
    send_text(&mut a, &oversized).await;
    expect_close(&mut a).await;
    wait_for_members(&server.hub, 0).await;
}

#[tokio::test]
async fn http_endpoints() {
    let server = start_server().await;
    let _client = join(&server).await;
    wait_for_members(&server.hub, 1).await;

    let base = format!("http://{}", server.addr);

    let health = tokio_test::assert_ok!(reqwest::get(format!("{base}/health")).await);
    assert_eq!(health.status().as_u16(), 200);
    let body: serde_json::Value = tokio_test::assert_ok!(health.json().await);
    assert_eq!(body["connections"], 1);

    let index = tokio_test::assert_ok!(reqwest::get(format!("{base}/")).await);
    assert_eq!(index.status().as_u16(), 200);
    let html = tokio_test::assert_ok!(index.text().await);
    assert!(html.contains("/ws"));

    let missing = tokio_test::assert_ok!(reqwest::get(format!("{base}/missing")).await);
    assert_eq!(missing.status().as_u16(), 404);
}
