//! In-memory subscriber for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use parking_lot::Mutex;

use super::subscriber::{ChannelError, Subscriber, SubscriberId};

/// Records every payload it is sent. Once `fail` is set, sends return
/// `ChannelError::Closed`. A `delay` stands in for a slow peer.
pub struct MockSubscriber {
    id: SubscriberId,
    delay: Option<Duration>,
    pub received: Mutex<Vec<Bytes>>,
    pub fail: AtomicBool,
    pub closed: AtomicBool,
    pub close_calls: AtomicUsize,
}

impl MockSubscriber {
    pub fn new() -> Self {
        Self {
            id: SubscriberId::new(),
            delay: None,
            received: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn failing() -> Arc<Self> {
        let sub = Self::new();
        sub.fail.store(true, Ordering::SeqCst);
        Arc::new(sub)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::new()
        })
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Subscriber for MockSubscriber {
    fn id(&self) -> &SubscriberId {
        &self.id
    }

    async fn send(&self, payload: Bytes) -> Result<(), ChannelError> {
        if self.fail.load(Ordering::SeqCst) || self.is_closed() {
            return Err(ChannelError::Closed);
        }
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            // Yield so concurrent broadcasts actually interleave.
            None => tokio::task::yield_now().await,
        }
        self.received.lock().push(payload);
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
