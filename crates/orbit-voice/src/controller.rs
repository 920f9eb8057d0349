//! Voice Session Controller - the main coordination layer
//!
//! Ties the recognition stream, the silence detector and the response pipeline
//! into one state machine (`Idle`, `Listening`, `Processing`). Everything runs on
//! a single task: commands, recognition events, the silence deadline, the
//! restart deadline and the in-flight pipeline future are multiplexed with
//! `tokio::select!`, so session state needs no locks.

use crate::config::{RestartPolicy, VoiceConfig};
use crate::error::{VoiceError, VoiceResult};
use crate::events::{MessageRole, StatusClass, UiSink};
use crate::pipeline::{PipelineOutcome, PipelineState, ResponsePipeline};
use crate::playback::AudioPlayback;
use crate::recognition::{RecognitionEvent, RecognitionSettings, RecognitionStream, SpeechCapability};
use crate::responder::Responder;
use crate::session::{Session, SessionState, Utterance};
use crate::silence::SilenceDetector;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type Turn = BoxFuture<'static, PipelineOutcome>;

/// Requests from the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    /// Manual stop; processes whatever was said so far.
    Stop,
    /// Single start/stop button.
    Toggle,
    SetContinuousMode(bool),
    Shutdown,
}

/// How a processing phase ended, for the restart decision.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The finalized text was empty; nothing was sent.
    NothingToProcess,
    Pipeline(PipelineOutcome),
}

impl TurnOutcome {
    pub fn restart_delay(&self, policy: &RestartPolicy) -> Duration {
        match self {
            TurnOutcome::NothingToProcess => policy.completion_delay(),
            TurnOutcome::Pipeline(outcome) => outcome.restart_delay(policy),
        }
    }
}

/// Host capabilities the controller takes ownership of.
pub struct Capabilities {
    /// `None` when the host has no speech recognizer.
    pub speech: Option<Box<dyn SpeechCapability>>,
    pub responder: Arc<dyn Responder>,
    pub playback: Arc<dyn AudioPlayback>,
}

/// Cloneable handle for driving a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    pipeline: watch::Receiver<PipelineState>,
}

impl ControllerHandle {
    pub fn send(&self, command: Command) -> VoiceResult<()> {
        self.commands
            .send(command)
            .map_err(|e| VoiceError::ChannelSend(e.to_string()))
    }

    pub fn start(&self) -> VoiceResult<()> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> VoiceResult<()> {
        self.send(Command::Stop)
    }

    pub fn toggle(&self) -> VoiceResult<()> {
        self.send(Command::Toggle)
    }

    pub fn set_continuous_mode(&self, enabled: bool) -> VoiceResult<()> {
        self.send(Command::SetContinuousMode(enabled))
    }

    pub fn shutdown(&self) -> VoiceResult<()> {
        self.send(Command::Shutdown)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn pipeline_state(&self) -> PipelineState {
        *self.pipeline.borrow()
    }
}

/// Owns the session and every collaborator of the voice loop.
pub struct VoiceSessionController {
    config: VoiceConfig,
    session: Session,
    recognition: RecognitionStream,
    silence: SilenceDetector,
    pipeline: ResponsePipeline,
    ui: UiSink,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<SessionState>,
    restart_at: Option<Instant>,
}

impl VoiceSessionController {
    /// Build a controller. Fails with `CapabilityUnavailable` (reported once on `ui`)
    /// when the host has no speech recognizer.
    pub fn new(config: VoiceConfig, capabilities: Capabilities, ui: UiSink) -> VoiceResult<(Self, ControllerHandle)> {
        config.validate()?;

        let settings = RecognitionSettings::for_locale(config.locale.clone());
        let recognition = match RecognitionStream::new(capabilities.speech, settings) {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "speech recognition unavailable");
                ui.status(
                    "Live speech recognition is not supported here. Please use a host with a speech recognizer.",
                    StatusClass::Error,
                );
                return Err(e);
            }
        };

        let pipeline = ResponsePipeline::new(capabilities.responder, capabilities.playback, ui.clone());
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let handle = ControllerHandle {
            commands: commands_tx,
            state: state_rx,
            pipeline: pipeline.subscribe(),
        };

        let controller = Self {
            silence: SilenceDetector::new(config.silence_timer()),
            session: Session::new(config.continuous_mode),
            config,
            recognition,
            pipeline,
            ui,
            commands,
            state_tx,
            restart_at: None,
        };

        Ok((controller, handle))
    }

    /// Run the voice loop until `Shutdown` or until every handle is dropped.
    pub async fn run(mut self) -> VoiceResult<()> {
        info!(
            continuous = self.session.continuous_mode,
            locale = %self.config.locale,
            silence_ms = self.config.silence_timer_ms,
            "voice session running"
        );

        if self.session.continuous_mode && self.config.auto_start {
            self.schedule_restart(self.config.restart.startup_delay());
        }

        let mut in_flight: Option<Turn> = None;

        loop {
            let silence_deadline = self.silence.deadline();
            let restart_deadline = self.restart_at;

            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => {
                        if let Some(turn) = self.handle_command(command) {
                            in_flight = Some(turn);
                        }
                    }
                },
                event = self.recognition.recv() => {
                    self.handle_recognition(event);
                }
                _ = sleep_until(silence_deadline), if silence_deadline.is_some() => {
                    if let Some(turn) = self.on_silence_timer(Instant::now()) {
                        in_flight = Some(turn);
                    }
                }
                outcome = next_outcome(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.on_outcome(TurnOutcome::Pipeline(outcome));
                }
                _ = sleep_until(restart_deadline), if restart_deadline.is_some() => {
                    self.restart_at = None;
                    self.on_restart_due();
                }
            }
        }

        info!("voice session shutting down");
        self.recognition.stop();
        self.silence.cancel();
        self.restart_at = None;
        if let Some(turn) = in_flight.take() {
            // In-flight work is never cancelled.
            let outcome = turn.await;
            debug!(?outcome, "last response finished");
        }
        self.session.listening = false;
        self.session.processing = false;
        self.publish_state();
        Ok(())
    }

    fn handle_command(&mut self, command: Command) -> Option<Turn> {
        debug!(?command, state = self.session.state().as_str(), "command");
        match command {
            Command::Start => {
                self.start_listening();
                None
            }
            Command::Stop => self.manual_stop(),
            Command::Toggle => {
                if self.session.processing {
                    debug!("toggle ignored while a response is in flight");
                    None
                } else if self.session.listening {
                    self.manual_stop()
                } else {
                    self.start_listening();
                    None
                }
            }
            Command::SetContinuousMode(enabled) => {
                self.set_continuous_mode(enabled);
                None
            }
            Command::Shutdown => None,
        }
    }

    fn set_continuous_mode(&mut self, enabled: bool) {
        self.session.continuous_mode = enabled;
        if enabled {
            self.ui.status(
                "Continuous conversation mode is on. You can speak at any time.",
                StatusClass::Neutral,
            );
        } else {
            if self.restart_at.take().is_some() {
                debug!("pending restart cancelled");
            }
            self.ui.status(
                "Continuous conversation mode is off. Press the microphone button to speak.",
                StatusClass::Neutral,
            );
        }
        info!(enabled, "continuous mode changed");
    }

    /// `Idle → Listening`. Ignored while processing or already listening.
    fn start_listening(&mut self) {
        if self.session.processing {
            debug!("start ignored while a response is in flight");
            return;
        }
        if self.session.listening {
            debug!("already listening");
            return;
        }

        self.restart_at = None;
        self.silence.cancel();
        self.recognition.stop();
        self.session.begin_cycle(Instant::now());

        if let Err(e) = self.recognition.start() {
            self.session.listening = false;
            error!(error = %e, "could not start recognition");
            self.ui.status(format!("Could not access the microphone: {}", e), StatusClass::Error);
            self.publish_state();
            return;
        }

        info!("listening");
        self.ui.listening(true);
        self.ui.interim("");
        self.ui.status("Listening... You can start speaking.", StatusClass::Recording);
        self.publish_state();
    }

    fn stop_listening(&mut self) {
        self.recognition.stop();
        self.silence.cancel();
        self.session.listening = false;
        self.ui.listening(false);
    }

    /// Manual stop: process what was said, or return to idle when nothing was.
    fn manual_stop(&mut self) -> Option<Turn> {
        if !self.session.listening {
            return None;
        }
        self.stop_listening();

        if !self.session.transcript.has_text() {
            info!("stopped with nothing detected");
            self.ui.interim("");
            self.ui.status("No speech detected.", StatusClass::Neutral);
            self.publish_state();
            return None;
        }

        self.session.transcript.promote_interim();
        self.process_result()
    }

    fn handle_recognition(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => debug!("recognition is listening"),
            RecognitionEvent::Fragment(fragment) => {
                if !self.session.listening || self.session.processing {
                    debug!(index = fragment.sequence_index, "fragment outside a listening cycle dropped");
                    return;
                }
                let now = Instant::now();
                self.session.transcript.apply(&fragment);
                self.session.last_speech = Some(now);
                self.silence.arm(now);
                if fragment.is_final {
                    debug!(text = %self.session.final_transcript(), "final fragment");
                }
                self.ui.interim(self.session.transcript.display_text());
            }
            RecognitionEvent::Error(kind) => {
                warn!(kind = %kind, "recognition error");
                self.ui.status(kind.describe(), StatusClass::Error);
            }
            RecognitionEvent::Ended => match self.recognition.handle_ended(&self.session) {
                Ok(restarted) => debug!(restarted, "recognition ended"),
                Err(e) => {
                    self.silence.cancel();
                    self.session.listening = false;
                    self.ui.listening(false);
                    self.ui.status(
                        format!("Could not restart speech recognition: {}", e),
                        StatusClass::Error,
                    );
                    self.publish_state();
                }
            },
        }
    }

    fn on_silence_timer(&mut self, now: Instant) -> Option<Turn> {
        if !self.session.listening || self.session.processing {
            self.silence.cancel();
            return None;
        }
        if !self.silence.fire(now, &self.session) {
            // Gap measured from the last fragment; keep waiting while text is pending.
            if let Some(last) = self.session.last_speech {
                if self.session.transcript.has_text() {
                    self.silence.arm(last);
                }
            }
            return None;
        }
        info!("silence detected, processing utterance");
        self.session.transcript.promote_interim();
        self.stop_listening();
        self.process_result()
    }

    /// `Listening → Processing`: hand the finalized text to the pipeline.
    fn process_result(&mut self) -> Option<Turn> {
        self.session.processing = true;
        self.ui.interim("");
        self.publish_state();

        let Some(utterance) = Utterance::new(&self.session.final_transcript()) else {
            info!("nothing to process");
            self.ui.status("No speech detected, listening again...", StatusClass::Neutral);
            self.on_outcome(TurnOutcome::NothingToProcess);
            return None;
        };

        self.ui.message(MessageRole::User, utterance.text());
        self.ui.status("Getting a response...", StatusClass::Thinking);

        match self.pipeline.submit(utterance) {
            Ok(turn) => Some(turn),
            Err(e) => {
                warn!(error = %e, "pipeline refused the utterance");
                self.session.processing = false;
                self.publish_state();
                None
            }
        }
    }

    /// `Processing → Idle`, then schedule the restart when continuous mode is on.
    fn on_outcome(&mut self, outcome: TurnOutcome) {
        self.session.processing = false;
        self.publish_state();

        let completed = matches!(outcome, TurnOutcome::Pipeline(PipelineOutcome::Played));
        if self.session.continuous_mode {
            if completed {
                self.ui.status("Response complete. Listening again shortly...", StatusClass::Neutral);
            }
            self.schedule_restart(outcome.restart_delay(&self.config.restart));
        } else {
            if completed {
                self.ui.status(
                    "Response complete. Press the microphone button to speak.",
                    StatusClass::Neutral,
                );
            }
            info!("waiting for a manual start");
        }
    }

    fn schedule_restart(&mut self, delay: Duration) {
        debug!(delay_ms = delay.as_millis() as u64, "restart scheduled");
        self.restart_at = Some(Instant::now() + delay);
    }

    fn on_restart_due(&mut self) {
        if self.session.continuous_mode {
            self.start_listening();
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.session.state());
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_outcome(turn: &mut Option<Turn>) -> PipelineOutcome {
    match turn.as_mut() {
        Some(turn) => turn.await,
        None => std::future::pending().await,
    }
}
