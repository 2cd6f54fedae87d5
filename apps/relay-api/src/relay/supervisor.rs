//! Ownership of the per-connection read loops.
//!
//! Every accepted subscriber runs in its own task on a shared
//! [`TaskTracker`]. Each task also watches the supervisor's
//! [`CancellationToken`], so shutdown can interrupt reads that would
//! otherwise block until the peer goes away.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Clone, Default)]
pub struct ConnectionSupervisor {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ConnectionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token a connection task selects on to learn about shutdown.
    pub fn shutdown_signal(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Number of connection tasks still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel every connection task and wait up to `grace` for them to finish.
    /// Returns `false` if some tasks were still running when `grace` elapsed.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.token.cancel();
        self.tracker.close();

        let remaining = self.tracker.len();
        tracing::info!(connections = remaining, "stopping subscriber connections");

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    still_running = self.tracker.len(),
                    grace_ms = grace.as_millis() as u64,
                    "subscriber connections did not stop within grace period"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_cancels_and_joins_tasks() {
        let supervisor = ConnectionSupervisor::new();
        let finished = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let signal = supervisor.shutdown_signal();
            let finished = finished.clone();
            supervisor.spawn(async move {
                signal.cancelled().await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(supervisor.active(), 5);

        assert!(supervisor.shutdown(Duration::from_secs(1)).await);
        assert!(supervisor.is_shutting_down());
        assert_eq!(finished.load(Ordering::SeqCst), 5);
        assert_eq!(supervisor.active(), 0);
    }

    #[tokio::test]
    async fn shutdown_reports_stuck_tasks() {
        let supervisor = ConnectionSupervisor::new();
        supervisor.spawn(async {
            // Ignores the shutdown signal.
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        assert!(!supervisor.shutdown(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn signal_taken_after_shutdown_is_already_cancelled() {
        let supervisor = ConnectionSupervisor::new();
        supervisor.shutdown(Duration::from_millis(10)).await;
        assert!(supervisor.shutdown_signal().is_cancelled());
    }
}
