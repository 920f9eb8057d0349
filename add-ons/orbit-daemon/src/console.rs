//! Console stand-ins for the host capabilities.
//!
//! Typed lines play the role of recognized speech; replies are fetched over HTTP
//! and only measured, not sounded.

use async_trait::async_trait;
use orbit_voice::{
    AudioPlayback, Command, PlaybackSignal, RecognitionEvent, RecognitionSettings, SpeechCapability,
    TranscriptFragment, VoiceResult,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One parsed line of console input.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Command(Command),
    /// Partial result for the current segment (`~text`).
    Interim(String),
    /// Final result; closes the current segment.
    Final(String),
    Unknown(String),
    Empty,
}

pub fn parse_line(line: &str) -> ConsoleInput {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return ConsoleInput::Empty;
    }
    if let Some(rest) = line.strip_prefix('~') {
        return ConsoleInput::Interim(rest.to_string());
    }
    let Some(command) = line.trim().strip_prefix('/') else {
        return ConsoleInput::Final(line.to_string());
    };
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("start"), None) => ConsoleInput::Command(Command::Start),
        (Some("stop"), None) => ConsoleInput::Command(Command::Stop),
        (Some("toggle"), None) => ConsoleInput::Command(Command::Toggle),
        (Some("quit"), None) | (Some("exit"), None) => ConsoleInput::Command(Command::Shutdown),
        (Some("continuous"), Some("on")) => ConsoleInput::Command(Command::SetContinuousMode(true)),
        (Some("continuous"), Some("off")) => ConsoleInput::Command(Command::SetContinuousMode(false)),
        _ => ConsoleInput::Unknown(line.to_string()),
    }
}

#[derive(Default)]
struct FeedState {
    sender: Option<mpsc::UnboundedSender<RecognitionEvent>>,
    next_index: u64,
}

/// Recognizer fed from stdin. Lines typed while it is stopped are dropped.
#[derive(Clone, Default)]
pub struct ConsoleSpeech {
    state: Arc<Mutex<FeedState>>,
}

impl ConsoleSpeech {
    /// Deliver a typed utterance. Returns false when recognition is not running.
    pub fn feed(&self, text: &str, is_final: bool) -> bool {
        let mut state = lock(&self.state);
        let index = state.next_index;
        let Some(tx) = state.sender.as_ref() else {
            return false;
        };
        let fragment = if is_final {
            TranscriptFragment::final_result(index, text)
        } else {
            TranscriptFragment::interim(index, text)
        };
        if tx.send(RecognitionEvent::Fragment(fragment)).is_err() {
            state.sender = None;
            return false;
        }
        if is_final {
            state.next_index += 1;
        }
        true
    }
}

impl SpeechCapability for ConsoleSpeech {
    fn start(
        &mut self,
        settings: &RecognitionSettings,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> VoiceResult<()> {
        let mut state = lock(&self.state);
        debug!(locale = %settings.locale, "console recognition started");
        let _ = events.send(RecognitionEvent::Started);
        state.sender = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = lock(&self.state);
        if let Some(tx) = state.sender.take() {
            let _ = tx.send(RecognitionEvent::Ended);
        }
    }
}

struct Loaded {
    signals: mpsc::UnboundedSender<PlaybackSignal>,
    bytes: usize,
}

/// Downloads the reply audio and reports its size in place of sounding it.
pub struct ConsolePlayback {
    client: reqwest::Client,
    current: Arc<Mutex<Option<Loaded>>>,
}

impl ConsolePlayback {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            current: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl AudioPlayback for ConsolePlayback {
    fn load(&self, url: &str) -> mpsc::UnboundedReceiver<PlaybackSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let current = Arc::clone(&self.current);
        let url = url.to_string();

        tokio::spawn(async move {
            let fetched = match client.get(&url).send().await {
                Ok(res) if res.status().is_success() => res.bytes().await.map_err(|e| e.to_string()),
                Ok(res) => Err(format!("audio fetch returned {}", res.status())),
                Err(e) => Err(e.to_string()),
            };
            match fetched {
                Ok(body) => {
                    debug!(%url, bytes = body.len(), "audio loaded");
                    *lock(&current) = Some(Loaded {
                        signals: tx.clone(),
                        bytes: body.len(),
                    });
                    let _ = tx.send(PlaybackSignal::Loaded);
                }
                Err(reason) => {
                    warn!(%url, error = %reason, "audio fetch failed");
                    let _ = tx.send(PlaybackSignal::Error(reason));
                }
            }
        });
        rx
    }

    async fn play(&self) -> Result<(), String> {
        let loaded = lock(&self.current).take();
        let Some(loaded) = loaded else {
            return Err("no audio loaded".to_string());
        };
        info!(bytes = loaded.bytes, "playing reply audio");
        let _ = loaded.signals.send(PlaybackSignal::Ended);
        Ok(())
    }
}
