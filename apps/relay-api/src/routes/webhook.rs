//! Webhook ingress: POST /webhook.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use relay_common::id::{prefix, prefixed_ulid};
use serde_json::Value;

use crate::error::{ApiError, ApiErrorBody};
use crate::relay::envelope::WebhookEnvelope;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(receive_webhook))
}

/// Wrap the JSON body with the request headers and broadcast it to every
/// subscriber.
///
/// The body is parsed whatever the `Content-Type`. The broadcast runs on its
/// own task, so the response is sent right away and does not depend on how
/// many subscribers received the event. A body that is not JSON is logged
/// and dropped, and still gets an empty 200.
#[utoipa::path(
    post,
    path = "/webhook",
    tag = "Relay",
    request_body(description = "Any JSON value", content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted; relayed to current subscribers if the body is JSON"),
        (status = 500, description = "Event could not be serialized", body = ApiErrorBody),
    ),
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let delivery_id = prefixed_ulid(prefix::DELIVERY);
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(%delivery_id, %err, bytes = body.len(), "dropping webhook with malformed JSON body");
            return Ok(StatusCode::OK);
        }
    };

    let envelope = WebhookEnvelope::from_request(&headers, body);
    let payload = envelope.to_bytes().map_err(|err| {
        tracing::error!(%delivery_id, %err, "failed to serialize webhook envelope");
        ApiError::internal("Failed to serialize event")
    })?;

    tracing::info!(
        %delivery_id,
        bytes = payload.len(),
        headers = envelope.headers.len(),
        "webhook received"
    );
    tracing::debug!(%delivery_id, envelope = %String::from_utf8_lossy(&payload), "relaying envelope");

    let span = tracing::info_span!("relay", %delivery_id);
    let _ = span.in_scope(|| state.broadcast.dispatch(payload));

    Ok(StatusCode::OK)
}
