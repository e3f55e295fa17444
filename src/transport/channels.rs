//! Named broadcast channels.
//!
//! Process-wide registry keyed by channel name, with lazy channel creation
//! and cleanup once the last receiver is gone.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::types::RelayEnvelope;

const BUFFER_SIZE: usize = 100;

#[derive(Debug, Default)]
pub struct BroadcastRegistry {
    channels: DashMap<String, broadcast::Sender<RelayEnvelope>>,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, name: &str) -> broadcast::Receiver<RelayEnvelope> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(BUFFER_SIZE).0)
            .subscribe()
    }

    /// Publishing to a channel nobody has subscribed to is a no-op.
    pub fn publish(&self, name: &str, envelope: RelayEnvelope) {
        if let Some(sender) = self.channels.get(name) {
            // Attempt to send; if all receivers dropped, clean up
            if sender.send(envelope).is_err() && sender.receiver_count() == 0 {
                drop(sender);
                self.channels.remove(name);
            }
        }
    }
}
