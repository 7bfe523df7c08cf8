use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

pub const DEFAULT_SCROLL_THRESHOLD: f64 = 100.0;

/// Scroll geometry reported by whatever renders the list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub inner_height: f64,
    pub scroll_top: f64,
    pub offset_height: f64,
}

impl ScrollMetrics {
    pub fn new(inner_height: f64, scroll_top: f64, offset_height: f64) -> Self {
        Self {
            inner_height,
            scroll_top,
            offset_height,
        }
    }

    /// True once the bottom of the viewport is within `threshold` of the
    /// end of the content.
    pub fn near_end(&self, threshold: f64) -> bool {
        self.inner_height + self.scroll_top + threshold >= self.offset_height
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, Sender<ScrollMetrics>>,
}

/// Fan-out of scroll events to the views currently listening.
#[derive(Clone, Default)]
pub struct ScrollBus {
    registry: Arc<Mutex<Registry>>,
}

impl ScrollBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> ScrollSubscription {
        let (tx, rx) = unbounded();
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(id, tx);
        ScrollSubscription {
            id,
            registry: Arc::downgrade(&self.registry),
            rx,
        }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, metrics: ScrollMetrics) -> usize {
        let registry = self.registry.lock();
        registry
            .subscribers
            .values()
            .filter(|tx| tx.send(metrics).is_ok())
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }
}

/// Listening handle; dropping it unsubscribes.
pub struct ScrollSubscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    rx: Receiver<ScrollMetrics>,
}

impl ScrollSubscription {
    pub fn drain(&self) -> impl Iterator<Item = ScrollMetrics> + '_ {
        self.rx.try_iter()
    }
}

impl Drop for ScrollSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().subscribers.remove(&self.id);
        }
    }
}
