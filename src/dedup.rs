//! Duplicate suppression.
//!
//! Two layers guard against redelivery: a short signature window on the
//! producer side catches the same entry arriving back-to-back through
//! redundant transport paths, and a bounded recent-id set on the consumer
//! side catches repeats across watcher restarts or paths that bypass the
//! signature check.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use crate::types::ChatMessage;

const DEFAULT_WINDOW: Duration = Duration::from_secs(1);
const DEFAULT_RECENT_CAPACITY: usize = 500;

/// Suppresses back-to-back redelivery of one entry observed through
/// multiple paths, without suppressing legitimately repeated chat text
/// sent at different real times.
#[derive(Debug)]
pub struct Deduplicator {
    window: Duration,
    last_signature: Option<String>,
    last_delivery: Option<Instant>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            last_signature: None,
            last_delivery: None,
        }
    }

    /// Whether `message` should be delivered. Rejects only when the
    /// signature exactly equals the previous delivery's and the elapsed
    /// time since that delivery is inside the window. A rejected repeat is
    /// not a delivery and does not refresh the window.
    pub fn should_deliver(&mut self, message: &ChatMessage) -> bool {
        self.should_deliver_at(message, Instant::now())
    }

    fn should_deliver_at(&mut self, message: &ChatMessage, now: Instant) -> bool {
        let signature = signature(message);
        if let (Some(last), Some(delivered_at)) = (&self.last_signature, self.last_delivery) {
            if *last == signature && now.duration_since(delivered_at) < self.window {
                tracing::trace!(
                    target: "chatcaster::dedup",
                    "suppressing repeat of {}",
                    message.id
                );
                return false;
            }
        }
        self.last_signature = Some(signature);
        self.last_delivery = Some(now);
        true
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

fn signature(message: &ChatMessage) -> String {
    format!(
        "{}|{}|{}",
        message.author, message.content, message.timestamp
    )
}

/// Insertion-ordered bounded set of recently delivered message ids.
/// Overflow drops the oldest entry.
#[derive(Debug)]
pub struct RecentIds {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentIds {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RECENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Records `id`. Returns false when it was already present, in which
    /// case the set is unchanged.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for RecentIds {
    fn default() -> Self {
        Self::new()
    }
}
