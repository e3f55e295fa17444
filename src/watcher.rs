//! Live chat observation.
//!
//! The watcher attaches to the page's chat container, extracts every entry
//! already rendered, then follows insertion batches. Container discovery is
//! retried on a fixed delay a bounded number of times; a page that reports
//! the stream as unavailable, or a container that never appears, produces a
//! single explicit error event instead of silent retry-forever.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::dom::{LiveList, LivePage};
use crate::extractor;
use crate::types::ChatMessage;

/// Page phrases that mean the stream is not viable for chat scraping.
const ERROR_PHRASES: [&str; 4] = [
    "Something went wrong",
    "Video unavailable",
    "This video is not available",
    "Chat is disabled",
];

pub const STREAM_UNAVAILABLE: &str = "Stream may not be live or chat is disabled";
pub const CONTAINER_NOT_FOUND: &str =
    "Chat container not found. Stream may not be live or chat is disabled.";

const WINDOW_READY_ATTEMPTS: u32 = 50;
const WINDOW_READY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageReadyError {
    #[error("Popup blocked. Please allow popups for this site.")]
    PopupBlocked,

    #[error("Timeout waiting for chat window to load")]
    Timeout,
}

/// Waits, time-boxed, for a freshly opened chat window to become readable.
/// `page` is `None` when the host refused to open the window at all; a
/// window whose chat container never renders inside the box times out.
/// Both end in an explicit error rather than waiting forever.
pub async fn await_page_ready(
    page: Option<Arc<LivePage>>,
) -> std::result::Result<Arc<LivePage>, PageReadyError> {
    let Some(page) = page else {
        return Err(PageReadyError::PopupBlocked);
    };
    for _ in 0..WINDOW_READY_ATTEMPTS {
        if page.container().is_some() {
            return Ok(page);
        }
        tokio::time::sleep(WINDOW_READY_INTERVAL).await;
    }
    Err(PageReadyError::Timeout)
}

/// Timing knobs for container discovery and entry extraction.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Attempts to locate the chat container before giving up
    pub container_attempts: u32,

    /// Delay between container discovery attempts
    pub container_retry_delay: Duration,

    /// Defer before reading a freshly inserted entry, so inner content
    /// (emoji images) finishes populating first
    pub extract_delay: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            container_attempts: 10,
            container_retry_delay: Duration::from_secs(1),
            extract_delay: Duration::from_millis(100),
        }
    }
}

/// Event stream produced by one watcher instance.
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherEvent {
    Message(ChatMessage),
    Error(String),
}

#[derive(Debug)]
pub struct MutationWatcher {
    shutdown: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl MutationWatcher {
    /// Starts observing `page` with default timing.
    pub fn observe(page: Arc<LivePage>, events: mpsc::Sender<WatcherEvent>) -> Self {
        Self::with_config(page, events, WatcherConfig::default())
    }

    pub fn with_config(
        page: Arc<LivePage>,
        events: mpsc::Sender<WatcherEvent>,
        config: WatcherConfig,
    ) -> Self {
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(page, events, config, shutdown_rx));
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Detaches from the container and stops the event stream. Extractions
    /// already in their defer window may still be delivered.
    pub async fn disconnect(mut self) {
        let _ = self.shutdown.send(()).await;
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

enum Discovery {
    Found(Arc<LiveList>),
    Exhausted,
    Shutdown,
}

async fn run(
    page: Arc<LivePage>,
    events: mpsc::Sender<WatcherEvent>,
    config: WatcherConfig,
    mut shutdown: mpsc::Receiver<()>,
) {
    if page_reports_errors(&page) {
        tracing::info!(
            target: "chatcaster::watcher",
            "page reports stream unavailable, not attaching"
        );
        let _ = events
            .send(WatcherEvent::Error(STREAM_UNAVAILABLE.to_string()))
            .await;
        return;
    }

    let container = match discover_container(&page, &config, &mut shutdown).await {
        Discovery::Found(container) => container,
        Discovery::Exhausted => {
            tracing::warn!(
                target: "chatcaster::watcher",
                attempts = config.container_attempts,
                "chat container never appeared"
            );
            let _ = events
                .send(WatcherEvent::Error(CONTAINER_NOT_FOUND.to_string()))
                .await;
            return;
        }
        Discovery::Shutdown => return,
    };

    let mut insertions = container.subscribe();

    // Entries rendered before we attached are read immediately.
    for node in container.snapshot() {
        for entry in extractor::find_entries(&node) {
            if let Some(message) = extractor::extract(entry) {
                if events.send(WatcherEvent::Message(message)).await.is_err() {
                    return;
                }
            }
        }
    }

    loop {
        tokio::select! {
            batch = insertions.recv() => match batch {
                Ok(range) => {
                    for index in range {
                        spawn_deferred_extraction(
                            container.clone(),
                            index,
                            events.clone(),
                            config.extract_delay,
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "chatcaster::watcher",
                        skipped,
                        "insertion feed lagged, entries missed"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }

    tracing::debug!(target: "chatcaster::watcher", "observer detached");
}

/// Reads the inserted item after the defer so late-populating inner
/// content is included.
fn spawn_deferred_extraction(
    container: Arc<LiveList>,
    index: usize,
    events: mpsc::Sender<WatcherEvent>,
    delay: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(node) = container.item(index) else {
            return;
        };
        for entry in extractor::find_entries(&node) {
            if let Some(message) = extractor::extract(entry) {
                let _ = events.send(WatcherEvent::Message(message)).await;
            }
        }
    });
}

fn page_reports_errors(page: &LivePage) -> bool {
    let text = page.body_text();
    ERROR_PHRASES.iter().any(|phrase| text.contains(phrase))
}

async fn discover_container(
    page: &LivePage,
    config: &WatcherConfig,
    shutdown: &mut mpsc::Receiver<()>,
) -> Discovery {
    for attempt in 1..=config.container_attempts {
        if let Some(container) = page.container() {
            tracing::debug!(
                target: "chatcaster::watcher",
                attempt,
                "chat container found"
            );
            return Discovery::Found(container);
        }
        if attempt < config.container_attempts {
            tokio::select! {
                _ = tokio::time::sleep(config.container_retry_delay) => {}
                _ = shutdown.recv() => return Discovery::Shutdown,
            }
        }
    }
    Discovery::Exhausted
}
