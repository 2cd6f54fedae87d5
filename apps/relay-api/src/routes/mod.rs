pub mod health;
pub mod webhook;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(webhook::router())
        .merge(crate::relay::server::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::liveness,
        health::health,
        // Relay
        webhook::receive_webhook,
        crate::relay::server::ws_upgrade,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            health::HealthResponse,
            crate::relay::envelope::WebhookEnvelope,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and status"),
        (name = "Relay", description = "Webhook ingress and WebSocket subscribers"),
    )
)]
pub struct ApiDoc;
