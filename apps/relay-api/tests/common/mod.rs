#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use relay_api::config::Config;
use relay_api::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build a test AppState with the default config and an empty registry.
pub fn test_state() -> AppState {
    AppState::new(Config::default())
}

/// Build the full application router wired to a fresh test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = relay_api::app::build_app(state.clone());
    (app, state)
}

/// A relay running on a real TCP port, stoppable through `shutdown`.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), relay_api::app::ServeError>>,
}

impl TestServer {
    /// Trigger graceful shutdown and wait for the server to return.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
            .expect("server error");
    }
}

/// Start an actual TCP server for WebSocket testing.
pub async fn start_server() -> TestServer {
    let state = test_state();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(relay_api::app::serve_on(listener, state.clone(), async move {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        state,
        shutdown: Some(tx),
        task,
    }
}

/// Open a subscriber connection to `/ws`.
pub async fn connect_subscriber(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/ws");
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws_stream
}

/// Poll until the registry holds exactly `expected` subscribers.
pub async fn wait_for_subscribers(state: &AppState, expected: usize) {
    let result = time::timeout(Duration::from_secs(5), async {
        while state.registry.len() != expected {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    assert!(
        result.is_ok(),
        "expected {expected} subscribers, registry has {}",
        state.registry.len()
    );
}

/// Read the next text frame, skipping control frames.
pub async fn next_text(ws: &mut WsClient) -> String {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream ended")
            .expect("ws read error");

        match msg {
            tokio_tungstenite::tungstenite::Message::Text(text) => return text.as_str().to_owned(),
            tokio_tungstenite::tungstenite::Message::Ping(_)
            | tokio_tungstenite::tungstenite::Message::Pong(_) => continue,
            other => panic!("expected text frame, got: {other:?}"),
        }
    }
}

/// POST a JSON body to `/webhook` with an extra header.
pub async fn post_webhook(
    addr: SocketAddr,
    header: (&str, &str),
    body: &serde_json::Value,
) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/webhook"))
        .header(header.0, header.1)
        .json(body)
        .send()
        .await
        .expect("webhook request")
}
