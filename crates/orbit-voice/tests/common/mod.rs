//! Shared fakes for the session tests: a speech capability driven by the test,
//! a scripted responder and a player that finishes instantly.

#![allow(dead_code)]

use async_trait::async_trait;
use orbit_voice::{
    AudioPlayback, Capabilities, ControllerHandle, PlaybackSignal, RecognitionEvent, RecognitionSettings, Responder,
    ResponseResult, SpeechCapability, TranscriptFragment, UiEvent, UiSink, VoiceConfig, VoiceResult,
    VoiceSessionController,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Default)]
pub struct SpeechLog {
    pub starts: Vec<Instant>,
    pub stops: usize,
    pub locale: Option<String>,
    sender: Option<mpsc::UnboundedSender<RecognitionEvent>>,
}

/// Recognizer whose results are pushed by the test.
#[derive(Clone, Default)]
pub struct FakeSpeech(pub Arc<Mutex<SpeechLog>>);

impl FakeSpeech {
    pub fn starts(&self) -> usize {
        self.0.lock().unwrap().starts.len()
    }

    pub fn last_start(&self) -> Option<Instant> {
        self.0.lock().unwrap().starts.last().copied()
    }

    pub fn send(&self, event: RecognitionEvent) {
        let log = self.0.lock().unwrap();
        let tx = log.sender.as_ref().expect("recognition is not running");
        tx.send(event).unwrap();
    }

    pub fn interim(&self, index: u64, text: &str) {
        self.send(RecognitionEvent::Fragment(TranscriptFragment::interim(index, text)));
    }

    pub fn final_result(&self, index: u64, text: &str) {
        self.send(RecognitionEvent::Fragment(TranscriptFragment::final_result(index, text)));
    }

    pub fn is_running(&self) -> bool {
        self.0.lock().unwrap().sender.is_some()
    }
}

impl SpeechCapability for FakeSpeech {
    fn start(
        &mut self,
        settings: &RecognitionSettings,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> VoiceResult<()> {
        let mut log = self.0.lock().unwrap();
        log.starts.push(Instant::now());
        log.locale = Some(settings.locale.clone());
        let _ = events.send(RecognitionEvent::Started);
        log.sender = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        let mut log = self.0.lock().unwrap();
        log.stops += 1;
        log.sender = None;
    }
}

/// Pops scripted replies in order; answers `"ok"` without audio once the script runs out.
#[derive(Default)]
pub struct ScriptedResponder {
    replies: Mutex<VecDeque<VoiceResult<ResponseResult>>>,
    pub calls: Mutex<Vec<String>>,
    latency: Duration,
}

impl ScriptedResponder {
    pub fn new(replies: Vec<VoiceResult<ResponseResult>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&self, text: &str) -> VoiceResult<ResponseResult> {
        self.calls.lock().unwrap().push(text.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ResponseResult::text("ok")))
    }
}

/// Loads and ends immediately; records every URL and play call.
#[derive(Default)]
pub struct InstantPlayer {
    pub loaded: Mutex<Vec<String>>,
    pub plays: Mutex<usize>,
    load_error: Option<String>,
    start_error: Option<String>,
    tx: Mutex<Option<mpsc::UnboundedSender<PlaybackSignal>>>,
}

impl InstantPlayer {
    /// Every load reports `reason` instead of becoming ready.
    pub fn failing_load(reason: &str) -> Self {
        Self {
            load_error: Some(reason.to_string()),
            ..Default::default()
        }
    }

    /// Loads fine, but `play` is refused with `reason`.
    pub fn failing_start(reason: &str) -> Self {
        Self {
            start_error: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn plays(&self) -> usize {
        *self.plays.lock().unwrap()
    }
}

#[async_trait]
impl AudioPlayback for InstantPlayer {
    fn load(&self, url: &str) -> mpsc::UnboundedReceiver<PlaybackSignal> {
        self.loaded.lock().unwrap().push(url.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        match &self.load_error {
            Some(reason) => tx.send(PlaybackSignal::Error(reason.clone())).unwrap(),
            None => tx.send(PlaybackSignal::Loaded).unwrap(),
        }
        *self.tx.lock().unwrap() = Some(tx);
        rx
    }

    async fn play(&self) -> Result<(), String> {
        if let Some(reason) = &self.start_error {
            return Err(reason.clone());
        }
        *self.plays.lock().unwrap() += 1;
        if let Some(tx) = self.tx.lock().unwrap().take() {
            let _ = tx.send(PlaybackSignal::Ended);
        }
        Ok(())
    }
}

pub struct Harness {
    pub handle: ControllerHandle,
    pub ui: mpsc::UnboundedReceiver<UiEvent>,
    pub speech: FakeSpeech,
    pub responder: Arc<ScriptedResponder>,
    pub player: Arc<InstantPlayer>,
    pub task: JoinHandle<VoiceResult<()>>,
}

/// Defaults with auto-start off so tests decide when listening begins.
pub fn config(continuous: bool) -> VoiceConfig {
    VoiceConfig {
        continuous_mode: continuous,
        auto_start: false,
        ..VoiceConfig::default()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn spawn(config: VoiceConfig, responder: ScriptedResponder) -> Harness {
    spawn_with_player(config, responder, InstantPlayer::default())
}

pub fn spawn_with_player(config: VoiceConfig, responder: ScriptedResponder, player: InstantPlayer) -> Harness {
    init_tracing();
    let speech = FakeSpeech::default();
    let responder = Arc::new(responder);
    let player = Arc::new(player);
    let (ui, ui_rx) = UiSink::channel();

    let capabilities = Capabilities {
        speech: Some(Box::new(speech.clone())),
        responder: responder.clone(),
        playback: player.clone(),
    };
    let (controller, handle) = VoiceSessionController::new(config, capabilities, ui).unwrap();
    let task = tokio::spawn(controller.run());

    Harness {
        handle,
        ui: ui_rx,
        speech,
        responder,
        player,
        task,
    }
}

impl Harness {
    /// Wait (in virtual time) for the next UI event matching `pred`, skipping others.
    pub async fn wait_for(&mut self, pred: impl Fn(&UiEvent) -> bool) -> UiEvent {
        let mut seen = self.collect_until(pred).await;
        seen.pop().unwrap()
    }

    /// Every event up to and including the first one matching `pred`.
    pub async fn collect_until(&mut self, pred: impl Fn(&UiEvent) -> bool) -> Vec<UiEvent> {
        let ui = &mut self.ui;
        let found = tokio::time::timeout(Duration::from_secs(600), async {
            let mut seen = Vec::new();
            loop {
                match ui.recv().await {
                    Some(event) => {
                        let done = pred(&event);
                        seen.push(event);
                        if done {
                            return seen;
                        }
                    }
                    None => panic!("ui channel closed"),
                }
            }
        })
        .await;
        found.expect("timed out waiting for ui event")
    }

    pub async fn start_listening(&mut self) {
        self.handle.start().unwrap();
        self.wait_for(|e| matches!(e, UiEvent::Listening { active: true })).await;
    }

    /// Everything already emitted, without waiting.
    pub fn drain(&mut self) -> Vec<UiEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.ui.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn assert_delay(elapsed: Duration, expected_ms: u64) {
    let expected = Duration::from_millis(expected_ms);
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(20),
        "expected ~{:?}, got {:?}",
        expected,
        elapsed
    );
}
