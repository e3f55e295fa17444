pub use crate::dedup::{Deduplicator, RecentIds};
pub use crate::dom::{LiveList, LivePage, Locator, Node};
pub use crate::error::{ChatcasterError, Result};
pub use crate::extractor::extract;
pub use crate::hub::{HubConnection, RelayHub};
pub use crate::speech::{
    AudioClip, HttpSpeechRenderer, SpeechManager, SpeechProvider, SpeechRenderer, SpeechSettings,
    SystemSpeechRenderer,
};
pub use crate::storage::{SnapshotPoller, SnapshotRecord, SnapshotStore};
pub use crate::transport::{
    BroadcastRegistry, ChannelSink, EventSink, HubSink, SnapshotSink, TransportFanout,
    TransportSink, WindowLinks, WindowSink,
};
pub use crate::types::{ChatMessage, EnvelopeKind, MessageKind, RelayEnvelope, Snapshot};
pub use crate::watcher::{
    MutationWatcher, PageReadyError, WatcherConfig, WatcherEvent, await_page_ready,
};

use anyhow::Context;
use once_cell::sync::OnceCell;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

mod dedup;
mod dom;
mod error;
mod extractor;
mod hub;
mod speech;
mod storage;
mod transport;
mod types;
mod watcher;

/// Name of the broadcast channel the producer publishes on.
pub const RELAY_CHANNEL: &str = "live-chat-relay";

static TRACING_GUARDS: OnceCell<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceCell::new();
static TRACING_INIT: OnceCell<()> = OnceCell::new();

fn init_tracing(logs_dir: &Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("chatcaster")
            .filename_suffix("log")
            .build(logs_dir)
            .expect("Failed to create file appender");

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .init();
    });
}

#[derive(Clone, Debug)]
pub struct ChatcasterConfig {
    /// Directory for application logs
    pub logs_dir: PathBuf,

    /// Container discovery and extraction timing
    pub watcher: WatcherConfig,

    /// Speech rendering settings, passed opaquely to the renderer
    pub speech: SpeechSettings,
}

impl ChatcasterConfig {
    pub fn new(logs_dir: &Path) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };

        Self {
            logs_dir: logs_dir.join(env_suffix),
            watcher: WatcherConfig::default(),
            speech: SpeechSettings::from_env(),
        }
    }
}

/// The consumer application: owns the relay hub, the transport fan-out the
/// producer publishes through, and the speech pipeline. One instance wires
/// the whole flow: DOM insertions → extraction → dedup → fan-out → hub →
/// speech rendering.
pub struct Chatcaster {
    pub config: ChatcasterConfig,
    hub: Arc<RelayHub>,
    channels: Arc<BroadcastRegistry>,
    events: Arc<EventSink>,
    fanout: Arc<TransportFanout>,
    speech: Arc<SpeechManager>,
    audio: Option<mpsc::UnboundedReceiver<AudioClip>>,
    status: broadcast::Sender<String>,
    watcher: Option<MutationWatcher>,
    pump: Option<JoinHandle<()>>,
    poller: Option<SnapshotPoller>,
    consumer_shutdown: mpsc::Sender<()>,
    consumer: Option<JoinHandle<()>>,
}

impl Chatcaster {
    /// Initializes the application: logging, the relay hub and its
    /// snapshot store, the transport fan-out, the polling fallback and the
    /// speech pipeline. The producer side attaches later via [`connect`].
    ///
    /// [`connect`]: Chatcaster::connect
    pub async fn initialize(config: ChatcasterConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", config.logs_dir))
            .map_err(ChatcasterError::from)?;

        // Only initialize tracing once
        init_tracing(&config.logs_dir);

        tracing::debug!("Logging initialized in directory: {:?}", config.logs_dir);

        // The hub persists into its own store; the producer fan-out writes
        // a second, page-local store. Mirrors the two stores the consumer
        // can reach in a real deployment.
        let hub_store = Arc::new(SnapshotStore::new());
        let page_store = Arc::new(SnapshotStore::new());
        let hub = Arc::new(RelayHub::new(hub_store.clone()));
        let channels = Arc::new(BroadcastRegistry::new());
        let events = Arc::new(EventSink::new());

        let fanout = Arc::new(TransportFanout::new(vec![
            Arc::new(HubSink::new(hub.clone())) as Arc<dyn TransportSink>,
            Arc::new(SnapshotSink::new(page_store.clone())) as Arc<dyn TransportSink>,
            Arc::new(ChannelSink::new(channels.clone(), RELAY_CHANNEL)) as Arc<dyn TransportSink>,
            Arc::new(WindowSink::new(WindowLinks::default())) as Arc<dyn TransportSink>,
            events.clone() as Arc<dyn TransportSink>,
        ]));

        let primary: Option<Box<dyn SpeechRenderer>> =
            match (config.speech.provider, &config.speech.api_key) {
                (SpeechProvider::Http, Some(key)) => {
                    Some(Box::new(HttpSpeechRenderer::new(key.clone())))
                }
                (SpeechProvider::Http, None) => {
                    tracing::warn!(
                        target: "chatcaster",
                        "no API credential configured, using system synthesis"
                    );
                    None
                }
                _ => None,
            };
        let (speech, audio) = SpeechManager::new(
            config.speech.clone(),
            primary,
            Box::new(SystemSpeechRenderer),
        );
        let speech = Arc::new(speech);

        let (status, _) = broadcast::channel(16);

        // Consumer side: the hub connection is the primary path, the
        // snapshot poller the fallback. Both feed one loop guarded by the
        // recent-id set.
        let connection = hub.subscribe();
        let (poll_tx, poll_rx) = mpsc::channel(64);
        let poller = SnapshotPoller::spawn(hub_store, poll_tx);
        let (consumer_shutdown, consumer_shutdown_rx) = mpsc::channel(1);
        let consumer = tokio::spawn(consume(
            connection,
            poll_rx,
            speech.clone(),
            status.clone(),
            consumer_shutdown_rx,
        ));

        Ok(Self {
            config,
            hub,
            channels,
            events,
            fanout,
            speech,
            audio: Some(audio),
            status,
            watcher: None,
            pump: None,
            poller: Some(poller),
            consumer_shutdown,
            consumer: Some(consumer),
        })
    }

    /// Attaches the producer pipeline to `page`: mutation watcher, then
    /// dedup, then the transport fan-out. An already-connected watcher is
    /// disconnected first.
    pub async fn connect(&mut self, page: Arc<LivePage>) {
        self.disconnect().await;

        let (events_tx, events_rx) = mpsc::channel(500);
        let watcher = MutationWatcher::with_config(page, events_tx, self.config.watcher.clone());
        let pump = tokio::spawn(pump_watcher_events(events_rx, self.fanout.clone()));

        self.watcher = Some(watcher);
        self.pump = Some(pump);
    }

    /// Detaches the producer pipeline. Consumer-side state (hub backlog,
    /// recent ids, speech queue) is left as is.
    pub async fn disconnect(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.disconnect().await;
        }
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
    }

    /// Stops everything: watcher, poller, consumer loop and playback.
    pub async fn shutdown(&mut self) {
        self.disconnect().await;
        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }
        let _ = self.consumer_shutdown.send(()).await;
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.await;
        }
        self.speech.shutdown().await;
    }

    /// The rendered audio stream. Yields once; the platform playback layer
    /// owns the receiver afterwards.
    pub fn take_audio_output(&mut self) -> Option<mpsc::UnboundedReceiver<AudioClip>> {
        self.audio.take()
    }

    /// Human-readable relay error reasons, as they are surfaced to the
    /// user (stream not live, chat disabled, container not found).
    pub fn subscribe_status(&self) -> broadcast::Receiver<String> {
        self.status.subscribe()
    }

    /// Raw envelopes as dispatched on the local event channel.
    pub fn subscribe_relay_events(&self) -> broadcast::Receiver<RelayEnvelope> {
        self.events.subscribe()
    }

    /// Envelopes published on the named broadcast channel.
    pub fn subscribe_relay_channel(&self) -> broadcast::Receiver<RelayEnvelope> {
        self.channels.subscribe(RELAY_CHANNEL)
    }

    pub fn hub(&self) -> Arc<RelayHub> {
        self.hub.clone()
    }

    pub fn speech(&self) -> &SpeechManager {
        &self.speech
    }
}

impl std::fmt::Debug for Chatcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chatcaster")
            .field("config", &self.config)
            .field("connected", &self.watcher.is_some())
            .field("sinks", &self.fanout.sink_count())
            .finish()
    }
}

/// Producer pump: watcher events through the signature dedup window, then
/// out over every transport channel.
async fn pump_watcher_events(
    mut events: mpsc::Receiver<WatcherEvent>,
    fanout: Arc<TransportFanout>,
) {
    let mut dedup = Deduplicator::new();
    while let Some(event) = events.recv().await {
        match event {
            WatcherEvent::Message(message) => {
                if dedup.should_deliver(&message) {
                    fanout.broadcast(&RelayEnvelope::message(message)).await;
                }
            }
            WatcherEvent::Error(reason) => {
                fanout.broadcast(&RelayEnvelope::error(reason)).await;
            }
        }
    }
}

/// Consumer loop: envelopes from the hub connection and snapshots from the
/// polling fallback, guarded by one recent-id set so a message reaching
/// the application over both paths plays exactly once.
async fn consume(
    mut connection: HubConnection,
    mut polled: mpsc::Receiver<Snapshot>,
    speech: Arc<SpeechManager>,
    status: broadcast::Sender<String>,
    mut shutdown: mpsc::Receiver<()>,
) {
    let mut recent = RecentIds::new();
    loop {
        tokio::select! {
            envelope = connection.recv() => match envelope {
                Some(envelope) => handle_envelope(envelope, &mut recent, &speech, &status),
                None => break,
            },
            snapshot = polled.recv() => match snapshot {
                Some(snapshot) => {
                    handle_envelope(RelayEnvelope::from(snapshot), &mut recent, &speech, &status)
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }

    tracing::debug!(target: "chatcaster::consumer", "consumer loop ended");
}

fn handle_envelope(
    envelope: RelayEnvelope,
    recent: &mut RecentIds,
    speech: &SpeechManager,
    status: &broadcast::Sender<String>,
) {
    match envelope.kind {
        EnvelopeKind::ChatMessage => {
            if let Some(message) = envelope.data {
                if recent.insert(&message.id) {
                    speech.speak_message(&message);
                } else {
                    tracing::trace!(
                        target: "chatcaster::consumer",
                        "already played {}",
                        message.id
                    );
                }
            }
        }
        EnvelopeKind::ChatError => {
            let reason = envelope
                .error
                .unwrap_or_else(|| "unknown relay error".to_string());
            tracing::warn!(target: "chatcaster::consumer", "relay error: {}", reason);
            let _ = status.send(reason);
        }
    }
}
