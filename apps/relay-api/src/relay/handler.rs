//! Messages sent by subscribers to the relay.

use axum::extract::ws::Message;

use super::subscriber::SubscriberId;

/// Handle one data frame received from a subscriber.
///
/// The relay is one-way: there are no client-to-server commands yet, so
/// frames are logged and dropped. New commands dispatch from here.
pub fn handle_client_message(subscriber_id: &SubscriberId, message: &Message) {
    let len = match message {
        Message::Text(text) => text.len(),
        Message::Binary(data) => data.len(),
        _ => 0,
    };
    tracing::trace!(subscriber_id = %subscriber_id, len, "ignoring client message");
}
