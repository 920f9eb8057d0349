//! Session state, transcript accumulation and the finalized utterance.

use crate::recognition::TranscriptFragment;
use std::collections::BTreeMap;
use tokio::time::Instant;

/// Controller state derived from the session flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Processing => "processing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    text: String,
    is_final: bool,
}

/// Fragments of one listening cycle, merged per segment in `sequence_index` order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    segments: BTreeMap<u64, Segment>,
}

impl Transcript {
    /// Merge a fragment. A final segment is never overwritten.
    pub fn apply(&mut self, fragment: &TranscriptFragment) {
        if let Some(existing) = self.segments.get(&fragment.sequence_index) {
            if existing.is_final {
                return;
            }
        }
        self.segments.insert(
            fragment.sequence_index,
            Segment {
                text: fragment.text.clone(),
                is_final: fragment.is_final,
            },
        );
    }

    pub fn final_text(&self) -> String {
        join_segments(self.segments.values().filter(|s| s.is_final))
    }

    pub fn interim_text(&self) -> String {
        join_segments(self.segments.values().filter(|s| !s.is_final))
    }

    /// Final followed by interim text, as shown live while the user speaks.
    pub fn display_text(&self) -> String {
        join_segments(self.segments.values())
    }

    /// True when final or interim text has any non-whitespace content.
    pub fn has_text(&self) -> bool {
        self.segments.values().any(|s| !s.text.trim().is_empty())
    }

    /// Treat pending interim segments as final (the last partial result is assumed complete).
    pub fn promote_interim(&mut self) {
        for segment in self.segments.values_mut() {
            segment.is_final = true;
        }
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }
}

fn join_segments<'a>(segments: impl Iterator<Item = &'a Segment>) -> String {
    let mut out = String::new();
    for segment in segments {
        let needs_space = !out.is_empty()
            && !out.ends_with(char::is_whitespace)
            && !segment.text.starts_with(char::is_whitespace)
            && !segment.text.is_empty();
        if needs_space {
            out.push(' ');
        }
        out.push_str(&segment.text);
    }
    out
}

/// The single mutable context of a conversation, owned by the controller.
#[derive(Debug, Clone)]
pub struct Session {
    pub listening: bool,
    pub processing: bool,
    pub continuous_mode: bool,
    pub transcript: Transcript,
    pub last_speech: Option<Instant>,
}

impl Session {
    pub fn new(continuous_mode: bool) -> Self {
        Self {
            listening: false,
            processing: false,
            continuous_mode,
            transcript: Transcript::default(),
            last_speech: None,
        }
    }

    /// Reset per-cycle fields at the start of a listening cycle.
    pub fn begin_cycle(&mut self, now: Instant) {
        self.transcript.clear();
        self.last_speech = Some(now);
        self.listening = true;
    }

    pub fn state(&self) -> SessionState {
        if self.processing {
            SessionState::Processing
        } else if self.listening {
            SessionState::Listening
        } else {
            SessionState::Idle
        }
    }

    pub fn final_transcript(&self) -> String {
        self.transcript.final_text()
    }
}

/// Finalized text of one spoken turn. Never empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance(String);

impl Utterance {
    /// `None` when nothing was said.
    pub fn new(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}
