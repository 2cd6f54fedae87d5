//! Broadcast fan-out to every registered subscriber.
//!
//! Each call snapshots the registry, releases the lock, and then writes to
//! the snapshot one subscriber at a time. A failed write is terminal for that
//! subscriber: it is deregistered and closed, never retried. Separate calls
//! run concurrently with each other and with connects/disconnects.
//!
//! Webhook-driven broadcasts go through [`Broadcaster::dispatch`], which runs
//! them on a tracked task detached from the request, so a sender that hangs
//! up cannot cut a fan-out short.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use super::registry::SubscriberRegistry;
use super::subscriber::Subscriber;

/// Outcome of a single broadcast. Informational only; a broadcast never fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers in the snapshot.
    pub attempted: usize,
    pub delivered: usize,
    /// Subscribers whose send failed and were dropped.
    pub failed: usize,
}

/// The broadcast hub. Cloneable; lives in AppState.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    tasks: TaskTracker,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self {
            registry,
            tasks: TaskTracker::new(),
        }
    }

    /// Start a broadcast on its own task and return immediately.
    ///
    /// The task runs inside the caller's current span and is joined by
    /// [`Broadcaster::drain`]. Dropping the returned handle does not stop it.
    pub fn dispatch(&self, payload: Bytes) -> JoinHandle<BroadcastReport> {
        let this = self.clone();
        self.tasks.spawn(
            async move {
                let report = this.broadcast(payload).await;
                tracing::info!(
                    attempted = report.attempted,
                    delivered = report.delivered,
                    failed = report.failed,
                    "webhook relayed"
                );
                report
            }
            .in_current_span(),
        )
    }

    /// Broadcasts started by `dispatch` that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait up to `grace` for dispatched broadcasts to finish. Returns `false`
    /// if some were still running when `grace` elapsed.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            tracing::info!(broadcasts = pending, "waiting for in-flight broadcasts");
        }

        match tokio::time::timeout(grace, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    still_running = self.tasks.len(),
                    grace_ms = grace.as_millis() as u64,
                    "broadcasts did not finish within grace period"
                );
                false
            }
        }
    }

    /// Deliver a pre-serialized payload to every current subscriber.
    ///
    /// Returns after every subscriber in the snapshot has been attempted.
    pub async fn broadcast(&self, payload: Bytes) -> BroadcastReport {
        let targets = self.registry.snapshot();
        let mut report = BroadcastReport {
            attempted: targets.len(),
            ..BroadcastReport::default()
        };

        for subscriber in targets {
            match subscriber.send(payload.clone()).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        subscriber_id = %subscriber.id(),
                        error = %err,
                        "failed to send to subscriber, dropping it"
                    );

                    // Deregister before closing: nothing left in the registry
                    // has been closed by us.
                    self.registry.remove(subscriber.id());
                    if let Err(err) = subscriber.close().await {
                        tracing::debug!(
                            subscriber_id = %subscriber.id(),
                            error = %err,
                            "error closing failed subscriber"
                        );
                    }
                }
            }
        }

        tracing::debug!(
            bytes = payload.len(),
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "broadcast complete"
        );
        report
    }
}
