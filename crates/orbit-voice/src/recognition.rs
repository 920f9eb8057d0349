//! Recognition stream: adapter around a continuous speech-recognition capability.
//!
//! The host supplies a [`SpeechCapability`] (browser engine, cloud streaming STT, a
//! console feeder in the daemon). The adapter owns it, opens a fresh event channel
//! per engine session, and applies the restart rule for engines that end a
//! continuous session on their own.

use crate::error::{VoiceError, VoiceResult};
use crate::session::Session;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Incremental recognition result. Fragments sharing a `sequence_index` belong to one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub text: String,
    pub is_final: bool,
    pub sequence_index: u64,
}

impl TranscriptFragment {
    pub fn interim(sequence_index: u64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            sequence_index,
        }
    }

    pub fn final_result(sequence_index: u64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            sequence_index,
        }
    }
}

/// Non-fatal recognition failures reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    AudioCapture,
    PermissionDenied,
    Other(String),
}

impl RecognitionErrorKind {
    /// Map an engine error code (`no-speech`, `audio-capture`, `not-allowed`, ...) to a kind.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::AudioCapture,
            "not-allowed" | "permission-denied" | "service-not-allowed" => Self::PermissionDenied,
            other => Self::Other(other.to_string()),
        }
    }

    /// Status line shown to the user.
    pub fn describe(&self) -> String {
        match self {
            Self::NoSpeech => "No speech detected. Make sure you are speaking into the microphone.".to_string(),
            Self::AudioCapture => "No microphone found. Please check your microphone.".to_string(),
            Self::PermissionDenied => "Microphone access was denied. Please check the permissions.".to_string(),
            Self::Other(code) => format!("Speech recognition error: {}", code),
        }
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no-speech"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::PermissionDenied => write!(f, "permission-denied"),
            Self::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Events emitted by a speech capability, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// Engine is actively listening.
    Started,
    Fragment(TranscriptFragment),
    /// Non-fatal; the engine may still be running.
    Error(RecognitionErrorKind),
    /// Engine stopped, possibly on its own.
    Ended,
}

/// Parameters handed to the engine on every start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    pub locale: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
}

impl RecognitionSettings {
    pub fn for_locale(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
        }
    }
}

/// Host speech-recognition engine. Implement for whatever recognizer the host has.
pub trait SpeechCapability: Send {
    /// Begin a session; deliver events through `events` until stopped or ended.
    fn start(
        &mut self,
        settings: &RecognitionSettings,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> VoiceResult<()>;

    /// Request termination. Must tolerate being called when not started.
    fn stop(&mut self);
}

/// Owns the speech capability and its current event channel.
pub struct RecognitionStream {
    capability: Box<dyn SpeechCapability>,
    settings: RecognitionSettings,
    events: Option<mpsc::UnboundedReceiver<RecognitionEvent>>,
    active: bool,
    /// Added to engine indices; engines number results from 0 on every session.
    index_offset: u64,
    /// One past the highest segment index delivered so far.
    next_index: u64,
}

impl RecognitionStream {
    /// Wrap the host capability. `None` means the host has no recognizer at all.
    pub fn new(
        capability: Option<Box<dyn SpeechCapability>>,
        settings: RecognitionSettings,
    ) -> VoiceResult<Self> {
        let capability = capability.ok_or(VoiceError::CapabilityUnavailable)?;
        Ok(Self {
            capability,
            settings,
            events: None,
            active: false,
            index_offset: 0,
            next_index: 0,
        })
    }

    /// Start a continuous session on a fresh channel; events of earlier sessions are discarded.
    pub fn start(&mut self) -> VoiceResult<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(rx);
        self.index_offset = self.next_index;
        if let Err(e) = self.capability.start(&self.settings, tx) {
            self.events = None;
            self.active = false;
            return Err(e);
        }
        self.active = true;
        debug!(locale = %self.settings.locale, "recognition started");
        Ok(())
    }

    /// Stop the engine. Idempotent.
    pub fn stop(&mut self) {
        if self.active {
            debug!("recognition stop requested");
        }
        self.capability.stop();
        self.events = None;
        self.active = false;
    }

    /// Whether a session was started and has not been stopped or ended.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Apply the restart rule after `Ended`: restart once, immediately, while the
    /// session is listening and not processing. Returns whether a restart happened.
    pub fn handle_ended(&mut self, session: &Session) -> VoiceResult<bool> {
        self.active = false;
        if !(session.listening && !session.processing) {
            debug!("recognition ended outside a listening cycle");
            return Ok(false);
        }
        info!("recognition ended on its own; restarting");
        match self.start() {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "recognition restart failed");
                Err(e)
            }
        }
    }

    /// Next event of the current engine session. Pends while no session is open.
    /// Fragment indices are shifted past those of earlier engine sessions.
    pub async fn recv(&mut self) -> RecognitionEvent {
        loop {
            let Some(rx) = self.events.as_mut() else {
                return std::future::pending().await;
            };
            let next = rx.recv().await;
            match next {
                Some(RecognitionEvent::Fragment(mut fragment)) => {
                    fragment.sequence_index = fragment.sequence_index.saturating_add(self.index_offset);
                    self.next_index = self.next_index.max(fragment.sequence_index.saturating_add(1));
                    return RecognitionEvent::Fragment(fragment);
                }
                Some(event) => return event,
                None => {
                    // Capability dropped its sender without sending Ended.
                    self.events = None;
                    if self.active {
                        self.active = false;
                        return RecognitionEvent::Ended;
                    }
                }
            }
        }
    }
}
