//! Best-effort fan-out of relay envelopes.
//!
//! A message leaves the producer context over several independent channels
//! so that at least one reaches the consumer regardless of execution
//! context. Every channel is a [`TransportSink`]; the fan-out iterates all
//! of them and swallows per-sink failures, so one broken path never stops
//! the rest.

mod channels;
mod sinks;

pub use channels::BroadcastRegistry;
pub use sinks::{ChannelSink, EventSink, HubSink, SnapshotSink, WindowLinks, WindowSink};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::RelayEnvelope;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Cross-context access denied: {0}")]
    CrossContext(String),

    #[error("Sink failure: {0}")]
    Sink(String),
}

/// One delivery path for relay envelopes. Implementations are best-effort;
/// a sink whose backing capability is absent reports success and does
/// nothing.
#[async_trait]
pub trait TransportSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, envelope: &RelayEnvelope) -> Result<(), TransportError>;
}

/// Broadcasts each envelope over every sink. Order across sinks is not
/// guaranteed and a failing sink never prevents the remaining sinks from
/// being attempted.
pub struct TransportFanout {
    sinks: Vec<Arc<dyn TransportSink>>,
}

impl TransportFanout {
    pub fn new(sinks: Vec<Arc<dyn TransportSink>>) -> Self {
        Self { sinks }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub async fn broadcast(&self, envelope: &RelayEnvelope) {
        for sink in &self.sinks {
            if let Err(error) = sink.deliver(envelope).await {
                tracing::debug!(
                    target: "chatcaster::transport",
                    sink = sink.name(),
                    "delivery failed: {}",
                    error
                );
            }
        }
    }
}
