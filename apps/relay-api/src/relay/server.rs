//! WebSocket upgrade handler and per-connection read loop.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

use super::handler::handle_client_message;
use super::registry::SubscriberRegistry;
use super::subscriber::{Subscriber, SubscriberId, WsSubscriber};
use super::supervisor::ConnectionSupervisor;

/// The request could not be upgraded to a WebSocket.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] WebSocketUpgradeRejection),
    #[error("server is shutting down")]
    ShuttingDown,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "Relay",
    responses(
        (status = 101, description = "Switched to WebSocket; webhook envelopes follow as text frames"),
        (status = 500, description = "Upgrade failed", body = ApiErrorBody),
    ),
)]
pub async fn ws_upgrade(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match accept(&state, upgrade) {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "websocket upgrade rejected");
            ApiError::internal(err.to_string()).into_response()
        }
    }
}

/// Complete the handshake. Once the connection is switched, the subscriber
/// is registered and its read loop is handed to the connection supervisor;
/// this returns without waiting for the subscriber to leave.
pub fn accept(
    state: &AppState,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, UpgradeError> {
    let upgrade = upgrade?;
    if state.connections.is_shutting_down() {
        return Err(UpgradeError::ShuttingDown);
    }

    let registry = state.registry.clone();
    let connections = state.connections.clone();

    Ok(upgrade
        .on_failed_upgrade(|err| {
            tracing::warn!(error = %err, "websocket upgrade failed after handshake");
        })
        .on_upgrade(move |socket| async move {
            attach(socket, registry, connections);
        }))
}

/// Register an upgraded socket and start its read loop.
fn attach(socket: WebSocket, registry: Arc<SubscriberRegistry>, connections: ConnectionSupervisor) {
    let (sink, stream) = socket.split();
    let subscriber = Arc::new(WsSubscriber::new(sink));
    let id = subscriber.id().clone();

    registry.add(subscriber.clone());
    let registration = Registration {
        registry: registry.clone(),
        id: id.clone(),
    };

    tracing::info!(
        subscriber_id = %id,
        subscribers = registry.len(),
        "subscriber connected"
    );

    let shutdown = connections.shutdown_signal();
    connections.spawn(read_loop(subscriber, stream, registration, shutdown));
}

/// Deregisters its subscriber when dropped, whichever way the read loop ends.
struct Registration {
    registry: Arc<SubscriberRegistry>,
    id: SubscriberId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

async fn read_loop(
    subscriber: Arc<WsSubscriber>,
    mut stream: SplitStream<WebSocket>,
    registration: Registration,
    shutdown: CancellationToken,
) {
    let id = subscriber.id().clone();

    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!(subscriber_id = %id, "closing subscriber for shutdown");
                break;
            }
            msg = stream.next() => msg,
        };

        match msg {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(message)) => handle_client_message(&id, &message),
            Some(Err(e)) => {
                tracing::debug!(?e, subscriber_id = %id, "ws read error");
                break;
            }
        }
    }

    drop(registration);
    if let Err(err) = subscriber.close().await {
        tracing::debug!(subscriber_id = %id, error = %err, "error closing subscriber");
    }

    tracing::info!(subscriber_id = %id, "subscriber disconnected");
}
