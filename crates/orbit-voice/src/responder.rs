//! Client for the remote "AI response" endpoint.
//!
//! `POST {base}/get-ai-response` with `{"text": ...}`. A non-2xx status is a
//! transport failure whatever the body says; an `error` field in a 2xx body is
//! an application failure.

use crate::config::VoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Path of the responder endpoint, relative to the base URL.
pub const RESPONSE_PATH: &str = "get-ai-response";

/// Outcome of one remote call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseResult {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why no audio was produced, when the responder says so.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ResponseResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_audio(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Audio reference, ignoring blank values.
    pub fn audio(&self) -> Option<&str> {
        self.audio_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Serialize)]
struct ResponseRequest<'a> {
    text: &'a str,
}

/// Produces a reply for one utterance.
#[async_trait]
pub trait Responder: Send + Sync {
    /// `Err` only for transport failures; application errors come back in `ResponseResult::error`.
    async fn respond(&self, text: &str) -> VoiceResult<ResponseResult>;
}

/// HTTP responder speaking the `/get-ai-response` JSON contract.
#[derive(Debug, Clone)]
pub struct HttpResponder {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpResponder {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> VoiceResult<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| VoiceError::Config(format!("invalid responder url '{}': {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Transport(e.to_string()))?;
        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &VoiceConfig) -> VoiceResult<Self> {
        Self::new(&config.responder_url, config.request_timeout())
    }

    pub fn endpoint(&self) -> VoiceResult<Url> {
        self.base_url
            .join(RESPONSE_PATH)
            .map_err(|e| VoiceError::Config(e.to_string()))
    }

    /// Resolve a possibly relative audio reference (e.g. `/static/audio/x.mp3`) against the base URL.
    pub fn resolve_audio_url(&self, reference: &str) -> String {
        match self.base_url.join(reference) {
            Ok(url) => url.to_string(),
            Err(_) => reference.to_string(),
        }
    }
}

#[async_trait]
impl Responder for HttpResponder {
    async fn respond(&self, text: &str) -> VoiceResult<ResponseResult> {
        let url = self.endpoint()?;
        debug!(%url, chars = text.chars().count(), "sending utterance to responder");
        let res = self
            .client
            .post(url)
            .json(&ResponseRequest { text })
            .send()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        let status = res.status();
        info!(status = status.as_u16(), "responder replied");
        if !status.is_success() {
            return Err(VoiceError::Transport(format!(
                "server responded with {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string()));
        }

        let mut result: ResponseResult = res
            .json()
            .await
            .map_err(|e| VoiceError::Transport(format!("unreadable response body: {}", e)))?;
        if let Some(audio) = result.audio().map(str::to_string) {
            result.audio_url = Some(self.resolve_audio_url(&audio));
        }
        Ok(result)
    }
}
