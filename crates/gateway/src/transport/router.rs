//! Subscription routing shared by all session implementations

use log::error;
use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{FeedCallback, SubscriptionId, Topic};
use crate::messages::FeedMessage;

struct Route {
    id: SubscriptionId,
    topic: Topic,
    callback: FeedCallback,
}

/// Maps topics to subscriber callbacks and delivers decoded messages
///
/// Callbacks run outside the routing lock, so a callback may subscribe or
/// unsubscribe without deadlocking. A panicking callback is caught, logged,
/// and counted; delivery to the remaining callbacks continues.
pub struct SubscriptionRouter {
    routes: RwLock<Vec<Route>>,
    next_id: AtomicU64,
    callback_panics: AtomicU64,
    decode_errors: AtomicU64,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            callback_panics: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
        }
    }

    /// Register a callback for a topic
    pub fn add(&self, topic: Topic, callback: FeedCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.routes.write().push(Route {
            id,
            topic,
            callback,
        });
        id
    }

    /// Remove a subscription, returning its topic
    pub fn remove(&self, id: SubscriptionId) -> Option<Topic> {
        let mut routes = self.routes.write();
        let pos = routes.iter().position(|r| r.id == id)?;
        Some(routes.remove(pos).topic)
    }

    /// Check whether any live subscription uses `topic`
    pub fn has_topic(&self, topic: &Topic) -> bool {
        self.routes.read().iter().any(|r| &r.topic == topic)
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    pub fn clear(&self) {
        self.routes.write().clear();
    }

    /// Number of callbacks that panicked so far
    pub fn callback_panics(&self) -> u64 {
        self.callback_panics.load(Ordering::Relaxed)
    }

    /// Count a frame the session could not decode
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// Deliver a message to every matching subscription; returns the delivery count
    pub fn dispatch(&self, msg: &FeedMessage) -> usize {
        let targets: Vec<(SubscriptionId, FeedCallback)> = self
            .routes
            .read()
            .iter()
            .filter(|r| r.topic.accepts(msg))
            .map(|r| (r.id, r.callback.clone()))
            .collect();

        for (id, callback) in &targets {
            if catch_unwind(AssertUnwindSafe(|| callback(msg))).is_err() {
                self.callback_panics.fetch_add(1, Ordering::Relaxed);
                error!("Callback for {} panicked on {} message", id, msg.kind());
            }
        }

        targets.len()
    }
}

impl Default for SubscriptionRouter {
    fn default() -> Self {
        Self::new()
    }
}
