//! Host audio output for synthesized replies.
//!
//! The capability takes a URL, reports lifecycle signals on a channel and starts
//! playback on request. Decoding and output devices stay on the host side.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lifecycle signals of one loaded source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSignal {
    /// Enough data is buffered to play.
    Loaded,
    /// Loading failed.
    Error(String),
    /// Playback reached the end naturally.
    Ended,
}

/// Host audio output. The controller owns the single instance.
#[async_trait]
pub trait AudioPlayback: Send + Sync {
    /// Point the player at `url`; signals for this source arrive on the returned channel.
    fn load(&self, url: &str) -> mpsc::UnboundedReceiver<PlaybackSignal>;

    /// Begin playback of the loaded source. `Err` carries the reason it could not start.
    async fn play(&self) -> Result<(), String>;
}

/// Load, start and wait for natural completion of one source.
pub async fn play_to_end(playback: &dyn AudioPlayback, url: &str) -> VoiceResult<()> {
    let mut signals = playback.load(url);

    loop {
        match signals.recv().await {
            Some(PlaybackSignal::Loaded) => break,
            Some(PlaybackSignal::Error(reason)) => return Err(VoiceError::PlaybackLoad(reason)),
            Some(PlaybackSignal::Ended) => {
                debug!("ended before loaded; ignoring");
            }
            None => {
                return Err(VoiceError::PlaybackLoad(
                    "player closed before the audio was loaded".to_string(),
                ))
            }
        }
    }
    info!(%url, "audio loaded, starting playback");

    playback.play().await.map_err(VoiceError::PlaybackStart)?;

    loop {
        match signals.recv().await {
            Some(PlaybackSignal::Ended) | None => break,
            Some(PlaybackSignal::Error(reason)) => {
                warn!(%url, error = %reason, "playback stopped with an error");
                break;
            }
            Some(PlaybackSignal::Loaded) => debug!("ignoring repeated load signal while playing"),
        }
    }
    info!("audio reply finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays a fixed script of signals; `play` optionally fails.
    struct ScriptedPlayer {
        before_play: Vec<PlaybackSignal>,
        after_play: Vec<PlaybackSignal>,
        play_error: Option<String>,
        tx: Mutex<Option<mpsc::UnboundedSender<PlaybackSignal>>>,
    }

    impl ScriptedPlayer {
        fn new(before: Vec<PlaybackSignal>, after: Vec<PlaybackSignal>, play_error: Option<&str>) -> Self {
            Self {
                before_play: before,
                after_play: after,
                play_error: play_error.map(str::to_string),
                tx: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl AudioPlayback for ScriptedPlayer {
        fn load(&self, _url: &str) -> mpsc::UnboundedReceiver<PlaybackSignal> {
            let (tx, rx) = mpsc::unbounded_channel();
            for s in &self.before_play {
                tx.send(s.clone()).unwrap();
            }
            *self.tx.lock().unwrap() = Some(tx);
            rx
        }

        async fn play(&self) -> Result<(), String> {
            if let Some(e) = &self.play_error {
                return Err(e.clone());
            }
            let guard = self.tx.lock().unwrap();
            let tx = guard.as_ref().unwrap();
            for s in &self.after_play {
                tx.send(s.clone()).unwrap();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn plays_until_ended() {
        let p = ScriptedPlayer::new(vec![PlaybackSignal::Loaded], vec![PlaybackSignal::Ended], None);
        assert!(play_to_end(&p, "a.mp3").await.is_ok());
    }

    #[tokio::test]
    async fn load_error_is_reported() {
        let p = ScriptedPlayer::new(vec![PlaybackSignal::Error("404".into())], vec![], None);
        assert_eq!(
            play_to_end(&p, "a.mp3").await,
            Err(VoiceError::PlaybackLoad("404".into()))
        );
    }

    #[tokio::test]
    async fn error_while_playing_ends_playback() {
        let p = ScriptedPlayer::new(
            vec![PlaybackSignal::Loaded],
            vec![PlaybackSignal::Error("stream interrupted".into())],
            None,
        );
        let finished = tokio::time::timeout(std::time::Duration::from_secs(1), play_to_end(&p, "a.mp3")).await;
        assert_eq!(finished, Ok(Ok(())));
    }

    #[tokio::test]
    async fn start_failure_is_reported() {
        let p = ScriptedPlayer::new(vec![PlaybackSignal::Loaded], vec![], Some("autoplay blocked"));
        assert_eq!(
            play_to_end(&p, "a.mp3").await,
            Err(VoiceError::PlaybackStart("autoplay blocked".into()))
        );
    }
}
