//! Events produced for the UI layer.

use crate::error::{VoiceError, VoiceResult};
use tokio::sync::mpsc;

/// Severity class of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Neutral,
    Recording,
    Thinking,
    Error,
}

/// Who a chat message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Status { text: String, class: StatusClass },
    Message { role: MessageRole, text: String },
    /// Live transcript of the current cycle; empty clears it.
    InterimTranscript { text: String },
    /// Listening started or stopped (start/stop button state).
    Listening { active: bool },
}

/// Sending half of the UI event stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UiSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiSink {
    pub fn new(tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. A UI that went away is not an error for the session.
    pub fn emit(&self, event: UiEvent) {
        if let Err(e) = self.try_emit(event) {
            tracing::debug!(error = %e, "ui event dropped");
        }
    }

    pub fn try_emit(&self, event: UiEvent) -> VoiceResult<()> {
        self.tx
            .send(event)
            .map_err(|e| VoiceError::ChannelSend(e.to_string()))
    }

    pub fn status(&self, text: impl Into<String>, class: StatusClass) {
        self.emit(UiEvent::Status {
            text: text.into(),
            class,
        });
    }

    pub fn message(&self, role: MessageRole, text: impl Into<String>) {
        self.emit(UiEvent::Message {
            role,
            text: text.into(),
        });
    }

    pub fn interim(&self, text: impl Into<String>) {
        self.emit(UiEvent::InterimTranscript { text: text.into() });
    }

    pub fn listening(&self, active: bool) {
        self.emit(UiEvent::Listening { active });
    }
}
