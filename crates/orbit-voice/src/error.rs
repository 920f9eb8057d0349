//! Error types for the ORBIT voice session

use crate::recognition::RecognitionErrorKind;
use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while running a voice session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoiceError {
    #[error("Speech recognition is not available on this host")]
    CapabilityUnavailable,

    #[error("Speech recognition error: {0}")]
    Recognition(RecognitionErrorKind),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Responder error: {0}")]
    Application(String),

    #[error("Audio could not be loaded: {0}")]
    PlaybackLoad(String),

    #[error("Audio could not be started: {0}")]
    PlaybackStart(String),

    #[error("A response is already in flight")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for VoiceError {
    fn from(err: std::io::Error) -> Self {
        VoiceError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(err: reqwest::Error) -> Self {
        VoiceError::Transport(err.to_string())
    }
}

impl From<config::ConfigError> for VoiceError {
    fn from(err: config::ConfigError) -> Self {
        VoiceError::Config(err.to_string())
    }
}
