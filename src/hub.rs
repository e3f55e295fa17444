//! Process-wide relay mediator.
//!
//! The hub sits between the producer context (the page scraper) and any
//! number of consumer contexts. Published messages are queued in a bounded
//! backlog, persisted as the latest snapshot, and pushed to every connected
//! consumer; a consumer that attaches late drains whatever the backlog
//! holds, exactly once.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::storage::SnapshotStore;
use crate::types::{ChatMessage, RelayEnvelope};

const BACKLOG_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct RelayHub {
    state: Mutex<HubState>,
    snapshot: Arc<SnapshotStore>,
}

#[derive(Debug)]
struct HubState {
    backlog: VecDeque<RelayEnvelope>,
    consumers: Vec<Consumer>,
}

#[derive(Debug)]
struct Consumer {
    id: Uuid,
    sender: mpsc::UnboundedSender<RelayEnvelope>,
}

/// One consumer connection. Receives the backlog drain on connect, then
/// every envelope published while connected.
#[derive(Debug)]
pub struct HubConnection {
    id: Uuid,
    receiver: mpsc::UnboundedReceiver<RelayEnvelope>,
}

impl HubConnection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn recv(&mut self) -> Option<RelayEnvelope> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RelayEnvelope> {
        self.receiver.try_recv().ok()
    }
}

impl RelayHub {
    pub fn new(snapshot: Arc<SnapshotStore>) -> Self {
        Self {
            state: Mutex::new(HubState {
                backlog: VecDeque::with_capacity(BACKLOG_CAPACITY),
                consumers: Vec::new(),
            }),
            snapshot,
        }
    }

    /// Appends to the backlog (dropping the oldest past capacity),
    /// persists the latest snapshot, and pushes to every connected
    /// consumer.
    pub fn publish(&self, message: ChatMessage) {
        self.snapshot.set_latest(message.clone());

        let envelope = RelayEnvelope::message(message);
        let mut state = self.state.lock().expect("hub state poisoned");
        if state.backlog.len() == BACKLOG_CAPACITY {
            state.backlog.pop_front();
        }
        state.backlog.push_back(envelope.clone());
        Self::push_to_consumers(&mut state, &envelope);
    }

    /// Error signals reach every connected consumer but are neither
    /// deduplicated, backlogged nor persisted.
    pub fn publish_error(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(target: "chatcaster::hub", "relaying error: {}", reason);

        let envelope = RelayEnvelope::error(reason);
        let mut state = self.state.lock().expect("hub state poisoned");
        Self::push_to_consumers(&mut state, &envelope);
    }

    /// Connects a consumer. The backlog is drained into the new connection
    /// and then starts empty; only the first connection after a run of
    /// publishes receives the queued history.
    pub fn subscribe(&self) -> HubConnection {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let mut state = self.state.lock().expect("hub state poisoned");
        let drained = state.backlog.len();
        for envelope in state.backlog.drain(..) {
            let _ = sender.send(envelope);
        }
        state.consumers.push(Consumer { id, sender });

        tracing::debug!(
            target: "chatcaster::hub",
            consumer = %id,
            drained,
            "consumer connected"
        );
        HubConnection { id, receiver }
    }

    pub fn backlog_len(&self) -> usize {
        self.state.lock().expect("hub state poisoned").backlog.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.state
            .lock()
            .expect("hub state poisoned")
            .consumers
            .len()
    }

    fn push_to_consumers(state: &mut HubState, envelope: &RelayEnvelope) {
        state.consumers.retain(|consumer| {
            let alive = consumer.sender.send(envelope.clone()).is_ok();
            if !alive {
                tracing::debug!(
                    target: "chatcaster::hub",
                    consumer = %consumer.id,
                    "dropping disconnected consumer"
                );
            }
            alive
        });
    }
}
