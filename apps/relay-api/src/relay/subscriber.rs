//! Subscriber handles: the send/close abstraction the fan-out works against,
//! and its WebSocket implementation.

use std::fmt;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use relay_common::id::{prefix, PrefixedId};
use tokio::sync::Mutex;

/// Normal closure (RFC 6455, section 7.4.1).
const CLOSE_NORMAL: u16 = 1000;

/// Process-unique identity of a subscriber handle (`sub_` prefixed ULID).
///
/// Ids are never reused, so two handles compare equal only when they are the
/// same connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(String);

impl PrefixedId for SubscriberId {
    const PREFIX: &'static str = prefix::SUBSCRIBER;
}

impl SubscriberId {
    pub fn new() -> Self {
        Self(<Self as PrefixedId>::generate())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure to write to (or close) a subscriber's channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("subscriber channel is already closed")]
    Closed,
    #[error("websocket transport error: {0}")]
    Transport(#[from] axum::Error),
}

/// A live, persistent channel to one subscriber.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn id(&self) -> &SubscriberId;

    /// Deliver one complete message.
    async fn send(&self, payload: Bytes) -> Result<(), ChannelError>;

    /// Close the channel. Closing an already-closed channel is `Ok`.
    async fn close(&self) -> Result<(), ChannelError>;
}

/// The write half of an upgraded WebSocket.
///
/// The sink sits behind an async mutex so concurrent broadcasts write whole
/// frames one after another. `None` once the channel has been closed.
pub struct WsSubscriber {
    id: SubscriberId,
    sink: Mutex<Option<SplitSink<WebSocket, Message>>>,
}

impl WsSubscriber {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            id: SubscriberId::new(),
            sink: Mutex::new(Some(sink)),
        }
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    fn id(&self) -> &SubscriberId {
        &self.id
    }

    async fn send(&self, payload: Bytes) -> Result<(), ChannelError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(ChannelError::Closed)?;
        sink.send(frame(payload)).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(());
        };

        let close = Message::Close(Some(CloseFrame {
            code: CLOSE_NORMAL,
            reason: String::new().into(),
        }));
        // The peer may already be gone; the sink still has to be shut down.
        let sent = sink.send(close).await;
        let closed = sink.close().await;
        sent.and(closed).map_err(ChannelError::from)
    }
}

/// Envelopes are JSON, so they go out as text frames. Anything that is not
/// UTF-8 is sent as a binary frame instead of being mangled.
fn frame(payload: Bytes) -> Message {
    match std::str::from_utf8(&payload) {
        Ok(text) => Message::Text(text.to_owned().into()),
        Err(_) => Message::Binary(payload),
    }
}
