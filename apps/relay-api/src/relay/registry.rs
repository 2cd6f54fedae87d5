//! Registry of live subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::subscriber::{Subscriber, SubscriberId};

/// The authoritative set of connected subscribers.
///
/// One `parking_lot::Mutex` guards the whole map: inserts, removals and the
/// broadcast snapshot all go through it. The lock is never held across an
/// `.await`, so a slow subscriber cannot stall registry access for others.
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a subscriber. Returns `false` (and changes nothing) if the
    /// handle is already present.
    pub fn add(&self, subscriber: Arc<dyn Subscriber>) -> bool {
        let mut subs = self.subscribers.lock();
        if subs.contains_key(subscriber.id()) {
            return false;
        }
        subs.insert(subscriber.id().clone(), subscriber);
        true
    }

    /// Deregister a subscriber. Removing an absent id is a no-op, so the read
    /// loop and the fan-out may both remove the same handle.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        self.subscribers.lock().remove(id).is_some()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    /// Point-in-time copy of the current members, taken under the lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn Subscriber>> {
        self.subscribers.lock().values().cloned().collect()
    }

    /// Remove and return every member. Used at shutdown.
    pub fn drain(&self) -> Vec<Arc<dyn Subscriber>> {
        self.subscribers.lock().drain().map(|(_, sub)| sub).collect()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
