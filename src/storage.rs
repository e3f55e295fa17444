//! Single-slot snapshot persistence.
//!
//! The latest relayed message is written into a shared slot under the
//! `lastChatMessage` key shape. Writes are last-write-wins and notify
//! change subscribers; a polling consumer reads the slot on a fixed
//! interval with its own last-seen watermark, independent of the
//! event-driven delivery path.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::types::{ChatMessage, EnvelopeKind, Snapshot};

const CHANGE_BUFFER: usize = 16;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Full persisted record shape, as a host storage layer writes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    #[serde(rename = "lastChatMessage")]
    pub last_chat_message: Snapshot,
}

/// Shared single-slot store for the latest relayed message.
#[derive(Debug)]
pub struct SnapshotStore {
    slot: RwLock<Option<Snapshot>>,
    changes: broadcast::Sender<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            slot: RwLock::new(None),
            changes,
        }
    }

    /// Overwrites the slot with `message`, stamped with the current time,
    /// and notifies change subscribers. Stamps are strictly increasing so
    /// a polling watermark never misses a rapid overwrite.
    pub fn set_latest(&self, message: ChatMessage) -> Snapshot {
        let mut slot = self.slot.write().expect("snapshot slot poisoned");
        let mut timestamp = chrono::Utc::now().timestamp_millis();
        if let Some(previous) = slot.as_ref() {
            if timestamp <= previous.timestamp {
                timestamp = previous.timestamp + 1;
            }
        }
        let snapshot = Snapshot {
            kind: EnvelopeKind::ChatMessage,
            data: message,
            timestamp,
        };
        *slot = Some(snapshot.clone());
        drop(slot);
        let _ = self.changes.send(snapshot.clone());
        snapshot
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.slot.read().expect("snapshot slot poisoned").clone()
    }

    /// The slot as the full persisted record, for host storage layers.
    pub fn record(&self) -> Option<SnapshotRecord> {
        self.latest().map(|snapshot| SnapshotRecord {
            last_chat_message: snapshot,
        })
    }

    /// Change notifications, one per write. Receivers that fall behind see
    /// only the most recent writes, which matches the slot's semantics.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<Snapshot> {
        self.changes.subscribe()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Polling fallback consumer: checks the store every 500ms and forwards
/// snapshots newer than the last it has seen. Keeps its own watermark;
/// the event path's dedup state is never consulted.
#[derive(Debug)]
pub struct SnapshotPoller {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl SnapshotPoller {
    pub fn spawn(store: Arc<SnapshotStore>, output: mpsc::Sender<Snapshot>) -> Self {
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(Self::run(store, output, shutdown_rx));
        Self { shutdown, handle }
    }

    async fn run(
        store: Arc<SnapshotStore>,
        output: mpsc::Sender<Snapshot>,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        let mut last_seen: i64 = 0;
        let mut ticker = tokio::time::interval(POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(snapshot) = store.latest() else {
                        continue;
                    };
                    if snapshot.timestamp <= last_seen {
                        continue;
                    }
                    last_seen = snapshot.timestamp;
                    if output.send(snapshot).await.is_err() {
                        tracing::debug!(
                            target: "chatcaster::storage",
                            "poll consumer dropped, stopping poller"
                        );
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Stops the polling loop.
    pub async fn stop(self) {
        let _ = self.shutdown.send(()).await;
        let _ = self.handle.await;
    }
}
