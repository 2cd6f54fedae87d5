pub mod app;
pub mod config;
pub mod error;
pub mod relay;
pub mod routes;

use std::sync::Arc;

use config::Config;
use relay::fanout::Broadcaster;
use relay::registry::SubscriberRegistry;
use relay::supervisor::ConnectionSupervisor;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SubscriberRegistry>,
    pub broadcast: Arc<Broadcaster>,
    pub connections: ConnectionSupervisor,
}

impl AppState {
    /// Build the state with a fresh, empty subscriber registry.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        Self {
            config: Arc::new(config),
            broadcast: Arc::new(Broadcaster::new(registry.clone())),
            registry,
            connections: ConnectionSupervisor::new(),
        }
    }
}
