//! Orbit voice console host
//!
//! Runs a voice session against the configured responder with stdin standing
//! in for the microphone. Plain lines are final results, `~text` is a partial
//! result, and `/start`, `/stop`, `/toggle`, `/continuous on|off`, `/quit` are
//! commands.

mod console;

use anyhow::Context;
use console::{parse_line, ConsoleInput, ConsolePlayback, ConsoleSpeech};
use orbit_voice::{
    Capabilities, ControllerHandle, HttpResponder, MessageRole, StatusClass, UiEvent, UiSink, VoiceConfig,
    VoiceSessionController,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[orbit-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = VoiceConfig::load().context("load voice config")?;
    let responder = HttpResponder::from_config(&config).context("build responder client")?;
    let audio_client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("build audio client")?;

    let speech = ConsoleSpeech::default();
    let (ui, ui_rx) = UiSink::channel();
    let capabilities = Capabilities {
        speech: Some(Box::new(speech.clone())),
        responder: Arc::new(responder),
        playback: Arc::new(ConsolePlayback::new(audio_client)),
    };

    tracing::info!(
        responder_url = %config.responder_url,
        locale = %config.locale,
        continuous = config.continuous_mode,
        "Orbit daemon started"
    );

    tokio::spawn(print_ui_events(ui_rx));

    let (controller, handle) = VoiceSessionController::new(config, capabilities, ui)?;
    let mut session = tokio::spawn(controller.run());
    tokio::spawn(read_console(speech, handle.clone()));

    tokio::select! {
        result = &mut session => {
            result.context("voice session task")??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("CTRL-C received; shutting down");
            handle.shutdown()?;
            session.await.context("voice session task")??;
        }
    }

    Ok(())
}

async fn read_console(speech: ConsoleSpeech, handle: ControllerHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("stdin closed");
                let _ = handle.shutdown();
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                let _ = handle.shutdown();
                return;
            }
        };

        match parse_line(&line) {
            ConsoleInput::Command(command) => {
                if let Err(e) = handle.send(command) {
                    tracing::warn!(error = %e, "session is gone");
                    return;
                }
            }
            ConsoleInput::Interim(text) => {
                if !speech.feed(&text, false) {
                    tracing::info!(state = handle.state().as_str(), "not listening; input ignored");
                }
            }
            ConsoleInput::Final(text) => {
                if !speech.feed(&text, true) {
                    tracing::info!(state = handle.state().as_str(), "not listening; input ignored");
                }
            }
            ConsoleInput::Unknown(line) => tracing::warn!(%line, "unknown command"),
            ConsoleInput::Empty => {}
        }
    }
}

async fn print_ui_events(mut events: mpsc::UnboundedReceiver<UiEvent>) {
    while let Some(event) = events.recv().await {
        let at = chrono::Local::now().format("%H:%M:%S");
        match event {
            UiEvent::Message { role, text } => {
                let who = match role {
                    MessageRole::User => "you",
                    MessageRole::Assistant => "assistant",
                    MessageRole::System => "system",
                };
                println!("[{}] {}: {}", at, who, text);
            }
            UiEvent::Status { text, class } => match class {
                StatusClass::Error => tracing::warn!(status = %text),
                _ => tracing::info!(status = %text, class = ?class),
            },
            UiEvent::InterimTranscript { text } if !text.is_empty() => {
                tracing::debug!(%text, "live transcript");
            }
            UiEvent::InterimTranscript { .. } => {}
            UiEvent::Listening { active } => tracing::info!(listening = active),
        }
    }
}
