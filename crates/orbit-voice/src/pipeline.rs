//! Response pipeline: request, reply and playback for one finalized utterance.
//!
//! `Idle → Dispatched → AwaitingResult → {PlayingAudio | NoAudio | Failed} → Idle`.
//! Failures are converted into UI events here and never escape as errors; the
//! returned [`PipelineOutcome`] only drives the restart decision.

use crate::config::RestartPolicy;
use crate::error::{VoiceError, VoiceResult};
use crate::events::{MessageRole, StatusClass, UiSink};
use crate::playback::{play_to_end, AudioPlayback};
use crate::responder::{Responder, ResponseResult};
use crate::session::Utterance;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Dispatched,
    AwaitingResult,
    PlayingAudio,
    NoAudio,
    Failed,
}

/// Terminal result of one utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Reply shown and its audio played to the end.
    Played,
    /// Reply shown; audio failed to load or start.
    PlaybackFailed(VoiceError),
    /// Reply shown; the responder produced no audio.
    NoAudio,
    /// Transport or application failure.
    Failed(VoiceError),
}

impl PipelineOutcome {
    pub fn restart_delay(&self, policy: &RestartPolicy) -> Duration {
        match self {
            PipelineOutcome::Played | PipelineOutcome::PlaybackFailed(_) => policy.completion_delay(),
            PipelineOutcome::NoAudio | PipelineOutcome::Failed(_) => policy.failure_delay(),
        }
    }
}

/// Runs at most one utterance at a time.
pub struct ResponsePipeline {
    responder: Arc<dyn Responder>,
    playback: Arc<dyn AudioPlayback>,
    ui: UiSink,
    state: Arc<watch::Sender<PipelineState>>,
}

impl ResponsePipeline {
    pub fn new(responder: Arc<dyn Responder>, playback: Arc<dyn AudioPlayback>, ui: UiSink) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            responder,
            playback,
            ui,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Dispatch an utterance. Fails with `Busy` unless idle; otherwise the
    /// returned future runs the whole sequence and leaves the pipeline idle.
    pub fn submit(&self, utterance: Utterance) -> VoiceResult<BoxFuture<'static, PipelineOutcome>> {
        if self.state() != PipelineState::Idle {
            return Err(VoiceError::Busy);
        }
        self.state.send_replace(PipelineState::Dispatched);

        let responder = Arc::clone(&self.responder);
        let playback = Arc::clone(&self.playback);
        let ui = self.ui.clone();
        let state = Arc::clone(&self.state);

        Ok(async move {
            let outcome = run_utterance(responder.as_ref(), playback.as_ref(), &ui, &state, utterance).await;
            state.send_replace(PipelineState::Idle);
            outcome
        }
        .boxed())
    }
}

async fn run_utterance(
    responder: &dyn Responder,
    playback: &dyn AudioPlayback,
    ui: &UiSink,
    state: &watch::Sender<PipelineState>,
    utterance: Utterance,
) -> PipelineOutcome {
    state.send_replace(PipelineState::AwaitingResult);
    info!(text = %utterance.text(), "requesting response");

    let reply = match responder.respond(utterance.text()).await.and_then(accept) {
        Ok(reply) => reply,
        Err(e) => {
            state.send_replace(PipelineState::Failed);
            warn!(error = %e, "response failed");
            let reason = cause(&e);
            ui.message(MessageRole::System, format!("Error: {}", reason));
            ui.status(format!("An error occurred: {}", reason), StatusClass::Error);
            return PipelineOutcome::Failed(e);
        }
    };

    ui.message(MessageRole::Assistant, reply.text.trim());

    match reply.audio() {
        Some(url) => {
            state.send_replace(PipelineState::PlayingAudio);
            match play_to_end(playback, url).await {
                Ok(()) => PipelineOutcome::Played,
                Err(e) => {
                    warn!(error = %e, %url, "audio reply failed");
                    ui.status(format!("Audio could not be played: {}", cause(&e)), StatusClass::Error);
                    PipelineOutcome::PlaybackFailed(e)
                }
            }
        }
        None => {
            state.send_replace(PipelineState::NoAudio);
            warn!("response carried no audio");
            let text = match reply.warning.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
                Some(w) => format!("Audio reply could not be generated: {}", w),
                None => "Audio reply could not be generated".to_string(),
            };
            ui.status(text, StatusClass::Neutral);
            PipelineOutcome::NoAudio
        }
    }
}

/// Turn an application-level error field, or a reply without text, into an error.
fn accept(result: ResponseResult) -> VoiceResult<ResponseResult> {
    if let Some(error) = result.error.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        return Err(VoiceError::Application(error.to_string()));
    }
    if result.text.trim().is_empty() {
        return Err(VoiceError::Application("responder returned no text".to_string()));
    }
    Ok(result)
}

fn cause(e: &VoiceError) -> String {
    match e {
        VoiceError::Transport(m)
        | VoiceError::Application(m)
        | VoiceError::PlaybackLoad(m)
        | VoiceError::PlaybackStart(m) => m.clone(),
        other => other.to_string(),
    }
}
