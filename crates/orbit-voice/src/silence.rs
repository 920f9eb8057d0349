//! End-of-utterance detection for the fragment stream
//!
//! Implements the "Gap Logic" over recognition results: every fragment re-arms a
//! single deadline, so the detector fires only after a real quiet gap
//! (trailing-edge debounce), and only when some text was heard.

use crate::session::Session;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Owns the single pending silence deadline of a listening cycle.
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    window: Duration,
    deadline: Option<Instant>,
}

impl SilenceDetector {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Replace any pending deadline with `now + window`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Pending deadline, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Called when the deadline is reached. Disarms, then reports whether the
    /// utterance is over: the gap since the last speech is at least the window
    /// and the transcript holds non-whitespace text.
    pub fn fire(&mut self, now: Instant, session: &Session) -> bool {
        if self.deadline.take().is_none() {
            return false;
        }
        let elapsed = session
            .last_speech
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(self.window);
        debug!(elapsed_ms = elapsed.as_millis() as u64, "silence check");

        elapsed >= self.window && session.transcript.has_text()
    }
}
