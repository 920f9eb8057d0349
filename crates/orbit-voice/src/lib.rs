//! # Orbit Voice - Continuous Voice Conversation
//!
//! Hands-free conversation loop: listen, detect the end of an utterance by a
//! silence gap, fetch a reply from a remote responder, play its audio, then
//! resume listening. The host supplies the speech recognizer and the audio
//! output as capabilities; this crate owns the state machine around them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Voice Session Controller                     │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Recognition  │→ │  Transcript  │→ │   Silence    │       │
//! │  │   Stream     │  │  (segments)  │  │  Detector    │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! │         ↑ restart                            ↓ utterance     │
//! │  ┌──────────────┐                    ┌──────────────┐       │
//! │  │   Restart    │←───────────────────│   Response   │       │
//! │  │   Policy     │      outcome       │   Pipeline   │       │
//! │  └──────────────┘                    └──────────────┘       │
//! │                                   responder → playback       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod playback;
pub mod recognition;
pub mod responder;
pub mod session;
pub mod silence;

pub use config::{RestartPolicy, VoiceConfig};
pub use controller::{Capabilities, Command, ControllerHandle, TurnOutcome, VoiceSessionController};
pub use error::{VoiceError, VoiceResult};
pub use events::{MessageRole, StatusClass, UiEvent, UiSink};
pub use pipeline::{PipelineOutcome, PipelineState, ResponsePipeline};
pub use playback::{play_to_end, AudioPlayback, PlaybackSignal};
pub use recognition::{
    RecognitionErrorKind, RecognitionEvent, RecognitionSettings, RecognitionStream, SpeechCapability,
    TranscriptFragment,
};
pub use responder::{HttpResponder, Responder, ResponseResult, RESPONSE_PATH};
pub use session::{Session, SessionState, Transcript, Utterance};
pub use silence::SilenceDetector;
