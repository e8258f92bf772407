//! Synchronous in-process publish/subscribe.
//!
//! Decouples acquisition from replay: acquisition publishes file IDs,
//! replay (and acquisition itself, for re-fetch requests) subscribes.
//! Delivery is synchronous on the publisher's thread and not durable —
//! every handler persists to the registry before returning, so state lost
//! with a crash is reconstructed from storage on restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Topic published when a file must be (re)fetched.
pub const FILE_NEEDS_FETCH: &str = "file:download";
/// Topic published when a file is verified and ready for replay.
pub const FILE_READY: &str = "file:downloaded";

type Handler = Arc<dyn Fn(&str) + Send + Sync>;

/// Named-topic event bus. One instance is owned by the top-level
/// coordinator and injected into each task at construction.
#[derive(Default)]
pub struct EventBus {
    topics: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. Handlers run on the publisher's
    /// thread; they must be fast and must not re-enter the publishing
    /// component's locks.
    pub fn subscribe(&self, topic: &str, handler: impl Fn(&str) + Send + Sync + 'static) {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Deliver `file_id` to every subscriber of `topic`. The handler table
    /// lock is released before handlers run, so a handler may publish.
    pub fn publish(&self, topic: &str, file_id: &str) {
        let handlers = {
            let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
            topics.get(topic).cloned().unwrap_or_default()
        };
        for handler in handlers {
            handler(file_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delivers_to_subscriber() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(FILE_READY, move |id| sink.lock().unwrap().push(id.to_string()));

        bus.publish(FILE_READY, "file-1");
        bus.publish(FILE_READY, "file-2");

        assert_eq!(*seen.lock().unwrap(), vec!["file-1", "file-2"]);
    }

    #[test]
    fn delivers_to_all_subscribers_in_order() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            bus.subscribe(FILE_READY, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.publish(FILE_READY, "x");
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish("nobody:listens", "x");
    }

    #[test]
    fn topics_are_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(FILE_NEEDS_FETCH, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(FILE_READY, "x");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_may_publish_without_deadlock() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));

        let inner = bus.clone();
        bus.subscribe(FILE_READY, move |id| {
            inner.publish(FILE_NEEDS_FETCH, id);
        });
        let c = count.clone();
        bus.subscribe(FILE_NEEDS_FETCH, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(FILE_READY, "x");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
