//! Router assembly and the listener lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ConfigError;
use crate::relay::subscriber::Subscriber;
use crate::AppState;

/// How long subscriber read loops get to wind down on shutdown.
pub const CONNECTION_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("failed to load TLS certificate {cert_file} / key {key_file}: {source}")]
    Tls {
        cert_file: String,
        key_file: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The full application: routes, permissive CORS, and request tracing.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(crate::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until `shutdown` resolves,
/// over TLS when the config asks for it.
pub async fn serve<F>(state: AppState, shutdown: F) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.socket_addr()?;

    if state.config.use_tls {
        serve_tls(state, addr, shutdown).await
    } else {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        serve_on(listener, state, shutdown).await
    }
}

/// Serve plain HTTP/WS on an already-bound listener.
pub async fn serve_on<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "relay-api listening");

    let app = build_app(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(stop_subscribers(state.clone(), shutdown))
        .await?;

    close_remaining(&state).await;
    Ok(())
}

async fn serve_tls<F>(state: AppState, addr: SocketAddr, shutdown: F) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    // Errors only if a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cert_file = state.config.cert_file.clone();
    let key_file = state.config.key_file.clone();
    let tls = RustlsConfig::from_pem_file(&cert_file, &key_file)
        .await
        .map_err(|source| ServeError::Tls {
            cert_file,
            key_file,
            source,
        })?;

    let handle = axum_server::Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        let stop = stop_subscribers(state.clone(), shutdown);
        async move {
            stop.await;
            handle.graceful_shutdown(Some(CONNECTION_GRACE));
        }
    });

    tracing::info!(%addr, "relay-api listening (tls)");
    let app = build_app(state.clone());
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    close_remaining(&state).await;
    Ok(())
}

/// Wait for `shutdown`, let in-flight broadcasts finish, then stop and join
/// every subscriber read loop before letting the HTTP server stop.
async fn stop_subscribers<F>(state: AppState, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    shutdown.await;
    tracing::info!("shutdown requested");
    state.broadcast.drain(CONNECTION_GRACE).await;
    state.connections.shutdown(CONNECTION_GRACE).await;
}

/// Close any subscriber whose read loop did not deregister it in time.
async fn close_remaining(state: &AppState) {
    let remaining = state.registry.drain();
    if remaining.is_empty() {
        return;
    }

    tracing::warn!(count = remaining.len(), "closing subscribers left at shutdown");
    for subscriber in remaining {
        if let Err(err) = subscriber.close().await {
            tracing::debug!(subscriber_id = %subscriber.id(), error = %err, "error closing subscriber");
        }
    }
}
