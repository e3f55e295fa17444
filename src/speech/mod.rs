//! Speech playback glue.
//!
//! Messages are cleaned, phrased as "author says content", queued, and
//! rendered sequentially through the configured provider. A provider
//! failure or missing credential falls back to the local system renderer.
//! Stopping cancels the in-flight utterance and clears the queue as one
//! operation. Rendered clips leave on a channel; the audio device itself
//! is outside this crate.

mod renderer;

pub use renderer::{HttpSpeechRenderer, SpeechRenderer, SystemSpeechRenderer};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::types::ChatMessage;

static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid markup regex"));
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));
static MULTI_DOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").expect("valid regex"));
static MULTI_BANG: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}").expect("valid regex"));
static MULTI_QUESTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?{2,}").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Provider returned status {0}")]
    ProviderStatus(u16),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Which rendering backend to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProvider {
    /// Platform speech synthesis, always available
    #[default]
    System,
    /// Cloud provider over HTTP, needs a credential
    Http,
}

/// Settings handed opaquely to the rendering service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    pub provider: SpeechProvider,
    pub api_key: Option<String>,
    pub voice: String,
    pub speed: f32,
    pub volume: f32,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            provider: SpeechProvider::System,
            api_key: None,
            voice: "alloy".to_string(),
            speed: 1.0,
            volume: 1.0,
        }
    }
}

impl SpeechSettings {
    /// Reads `CHATCASTER_TTS_*` variables, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut settings = Self::default();
        if let Ok(provider) = std::env::var("CHATCASTER_TTS_PROVIDER") {
            if provider.eq_ignore_ascii_case("http") {
                settings.provider = SpeechProvider::Http;
            }
        }
        if let Ok(key) = std::env::var("CHATCASTER_TTS_API_KEY") {
            if !key.is_empty() {
                settings.api_key = Some(key);
            }
        }
        if let Ok(voice) = std::env::var("CHATCASTER_TTS_VOICE") {
            if !voice.is_empty() {
                settings.voice = voice;
            }
        }
        if let Ok(speed) = std::env::var("CHATCASTER_TTS_SPEED") {
            if let Ok(parsed) = speed.parse() {
                settings.speed = parsed;
            }
        }
        if let Ok(volume) = std::env::var("CHATCASTER_TTS_VOLUME") {
            if let Ok(parsed) = volume.parse() {
                settings.volume = parsed;
            }
        }
        settings
    }
}

/// One rendered utterance, ready for the platform audio layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub audio: Vec<u8>,
    pub text: String,
    pub volume: f32,
}

/// Normalizes message text before synthesis: inline markup stripped, URLs
/// replaced with "[Link]", runs of punctuation collapsed.
pub fn clean_text(text: &str) -> String {
    let text = MARKUP.replace_all(text, " ");
    let text = URL.replace_all(&text, "[Link]");
    let text = MULTI_DOT.replace_all(&text, ".");
    let text = MULTI_BANG.replace_all(&text, "!");
    let text = MULTI_QUESTION.replace_all(&text, "?");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

struct SpeechInner {
    settings: RwLock<SpeechSettings>,
    queue: Mutex<VecDeque<String>>,
    wake: Notify,
    generation: AtomicU64,
    primary: Option<Box<dyn SpeechRenderer>>,
    fallback: Box<dyn SpeechRenderer>,
    output: mpsc::UnboundedSender<AudioClip>,
}

/// Sequential utterance queue in front of the rendering service.
pub struct SpeechManager {
    inner: Arc<SpeechInner>,
    shutdown: mpsc::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechManager {
    /// Builds the manager and returns the channel its rendered clips
    /// arrive on. `primary` may be absent (no credential configured), in
    /// which case every utterance uses the fallback renderer.
    pub fn new(
        settings: SpeechSettings,
        primary: Option<Box<dyn SpeechRenderer>>,
        fallback: Box<dyn SpeechRenderer>,
    ) -> (Self, mpsc::UnboundedReceiver<AudioClip>) {
        let (output, clips) = mpsc::unbounded_channel();
        let inner = Arc::new(SpeechInner {
            settings: RwLock::new(settings),
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            generation: AtomicU64::new(0),
            primary,
            fallback,
            output,
        });
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(inner.clone(), shutdown_rx));
        (
            Self {
                inner,
                shutdown,
                handle: Mutex::new(Some(handle)),
            },
            clips,
        )
    }

    /// Queues one message for playback, phrased as "author says content".
    /// Messages whose content cleans down to nothing are skipped.
    pub fn speak_message(&self, message: &ChatMessage) {
        let text = clean_text(&message.content);
        if text.is_empty() {
            return;
        }
        self.speak(format!("{} says {}", message.author, text));
    }

    /// Queues raw text for playback.
    pub fn speak(&self, text: impl Into<String>) {
        self.inner
            .queue
            .lock()
            .expect("speech queue poisoned")
            .push_back(text.into());
        self.inner.wake.notify_one();
    }

    /// Cancels the in-flight utterance and clears everything queued, as
    /// one atomic stop.
    pub fn stop(&self) {
        self.inner
            .queue
            .lock()
            .expect("speech queue poisoned")
            .clear();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn configure(&self, settings: SpeechSettings) {
        *self.inner.settings.write().expect("speech settings poisoned") = settings;
    }

    pub fn queued(&self) -> usize {
        self.inner.queue.lock().expect("speech queue poisoned").len()
    }

    /// Stops playback and ends the worker.
    pub async fn shutdown(&self) {
        self.stop();
        let _ = self.shutdown.send(()).await;
        let handle = self
            .handle
            .lock()
            .expect("speech handle poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run(inner: Arc<SpeechInner>, mut shutdown: mpsc::Receiver<()>) {
    loop {
        let next = inner
            .queue
            .lock()
            .expect("speech queue poisoned")
            .pop_front();

        let Some(text) = next else {
            tokio::select! {
                _ = inner.wake.notified() => {}
                _ = shutdown.recv() => break,
            }
            continue;
        };

        let generation = inner.generation.load(Ordering::SeqCst);
        match render(&inner, &text).await {
            Ok(clip) => {
                // A stop() issued mid-render cancels the clip.
                if inner.generation.load(Ordering::SeqCst) == generation {
                    let _ = inner.output.send(clip);
                }
            }
            Err(error) => {
                tracing::warn!(
                    target: "chatcaster::speech",
                    "dropping utterance: {}",
                    error
                );
            }
        }
    }
}

async fn render(inner: &SpeechInner, text: &str) -> Result<AudioClip, SpeechError> {
    let settings = inner
        .settings
        .read()
        .expect("speech settings poisoned")
        .clone();

    let audio = match (&settings.provider, &inner.primary) {
        (SpeechProvider::Http, Some(primary)) => {
            match primary.render(text, &settings.voice, settings.speed).await {
                Ok(audio) => audio,
                Err(error) => {
                    tracing::warn!(
                        target: "chatcaster::speech",
                        provider = primary.name(),
                        "provider failed, falling back to {}: {}",
                        inner.fallback.name(),
                        error
                    );
                    inner
                        .fallback
                        .render(text, &settings.voice, settings.speed)
                        .await?
                }
            }
        }
        _ => {
            inner
                .fallback
                .render(text, &settings.voice, settings.speed)
                .await?
        }
    };

    Ok(AudioClip {
        audio,
        text: text.to_string(),
        volume: settings.volume,
    })
}
