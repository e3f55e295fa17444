//! The concrete delivery paths behind the fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use super::channels::BroadcastRegistry;
use super::{TransportError, TransportSink};
use crate::hub::RelayHub;
use crate::storage::SnapshotStore;
use crate::types::RelayEnvelope;

const EVENT_BUFFER: usize = 100;

/// Direct handoff into the process-wide relay mediator.
pub struct HubSink {
    hub: Option<Arc<RelayHub>>,
}

impl HubSink {
    pub fn new(hub: Arc<RelayHub>) -> Self {
        Self { hub: Some(hub) }
    }

    /// A sink with no mediator in reach; delivery is a silent skip.
    pub fn detached() -> Self {
        Self { hub: None }
    }
}

#[async_trait]
impl TransportSink for HubSink {
    fn name(&self) -> &'static str {
        "hub"
    }

    async fn deliver(&self, envelope: &RelayEnvelope) -> Result<(), TransportError> {
        let Some(hub) = &self.hub else {
            return Ok(());
        };
        if let Some(message) = &envelope.data {
            hub.publish(message.clone());
        } else if let Some(reason) = &envelope.error {
            hub.publish_error(reason.clone());
        }
        Ok(())
    }
}

/// Write-through of the latest message into a shared snapshot store.
/// Subscribers of the store see the change notification.
pub struct SnapshotSink {
    store: Option<Arc<SnapshotStore>>,
}

impl SnapshotSink {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn detached() -> Self {
        Self { store: None }
    }
}

#[async_trait]
impl TransportSink for SnapshotSink {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn deliver(&self, envelope: &RelayEnvelope) -> Result<(), TransportError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        // Only messages are persisted; the snapshot slot has no error shape.
        if let Some(message) = &envelope.data {
            store.set_latest(message.clone());
        }
        Ok(())
    }
}

/// Publish onto a named broadcast channel.
pub struct ChannelSink {
    registry: Option<Arc<BroadcastRegistry>>,
    channel: String,
}

impl ChannelSink {
    pub fn new(registry: Arc<BroadcastRegistry>, channel: impl Into<String>) -> Self {
        Self {
            registry: Some(registry),
            channel: channel.into(),
        }
    }

    pub fn detached(channel: impl Into<String>) -> Self {
        Self {
            registry: None,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl TransportSink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn deliver(&self, envelope: &RelayEnvelope) -> Result<(), TransportError> {
        if let Some(registry) = &self.registry {
            registry.publish(&self.channel, envelope.clone());
        }
        Ok(())
    }
}

/// Message ports to the execution contexts a page can reach: its own
/// window plus, when linked, the opener and parent windows.
#[derive(Debug, Default)]
pub struct WindowLinks {
    pub current: Option<mpsc::UnboundedSender<RelayEnvelope>>,
    pub opener: Option<mpsc::UnboundedSender<RelayEnvelope>>,
    pub parent: Option<mpsc::UnboundedSender<RelayEnvelope>>,
}

/// Post to the current context and any linked opener/parent contexts. A
/// link that is closed or cross-origin fails on its own path only.
pub struct WindowSink {
    links: WindowLinks,
}

impl WindowSink {
    pub fn new(links: WindowLinks) -> Self {
        Self { links }
    }
}

#[async_trait]
impl TransportSink for WindowSink {
    fn name(&self) -> &'static str {
        "window"
    }

    async fn deliver(&self, envelope: &RelayEnvelope) -> Result<(), TransportError> {
        for port in [&self.links.current, &self.links.opener, &self.links.parent]
            .into_iter()
            .flatten()
        {
            // A dead port means the linked window is gone or inaccessible.
            let _ = port.send(envelope.clone());
        }
        Ok(())
    }
}

/// Dispatch as a locally observable event in the producer's own context.
pub struct EventSink {
    events: broadcast::Sender<RelayEnvelope>,
}

impl EventSink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEnvelope> {
        self.events.subscribe()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportSink for EventSink {
    fn name(&self) -> &'static str {
        "event"
    }

    async fn deliver(&self, envelope: &RelayEnvelope) -> Result<(), TransportError> {
        // Nobody listening is fine; the event is simply unobserved.
        let _ = self.events.send(envelope.clone());
        Ok(())
    }
}
