//! Session configuration loaded from file and environment.
//!
//! | Key / Env | Default | Description |
//! |-----------|---------|-------------|
//! | `silence_timer_ms` / ORBIT_SILENCE_TIMER_MS | 2000 | Quiet gap that ends an utterance. |
//! | `locale` / ORBIT_LOCALE | tr-TR | Locale handed to the recognition capability. |
//! | `continuous_mode` / ORBIT_CONTINUOUS_MODE | true | Resume listening after every turn. |
//! | `auto_start` / ORBIT_AUTO_START | true | Start the first cycle on launch when continuous. |
//! | `responder_url` / ORBIT_RESPONDER_URL | http://127.0.0.1:5000 | Base URL of the responder. |
//! | `request_timeout_secs` / ORBIT_REQUEST_TIMEOUT_SECS | 30 | HTTP timeout for one request. |
//! | `restart.*` / ORBIT_RESTART__* | 1000 / 2000 / 1000 | Restart delays (see [`RestartPolicy`]). |

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_silence_timer_ms() -> u64 {
    2000
}

fn default_locale() -> String {
    "tr-TR".to_string()
}

fn default_true() -> bool {
    true
}

fn default_responder_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Delays applied before listening resumes in continuous mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// After a normal completion, a playback failure, or when nothing was said.
    #[serde(default = "RestartPolicy::default_completion_delay_ms")]
    pub completion_delay_ms: u64,
    /// After a transport/application error or a reply without audio.
    #[serde(default = "RestartPolicy::default_failure_delay_ms")]
    pub failure_delay_ms: u64,
    /// Before the first cycle when `auto_start` is on.
    #[serde(default = "RestartPolicy::default_startup_delay_ms")]
    pub startup_delay_ms: u64,
}

impl RestartPolicy {
    fn default_completion_delay_ms() -> u64 {
        1000
    }

    fn default_failure_delay_ms() -> u64 {
        2000
    }

    fn default_startup_delay_ms() -> u64 {
        1000
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }

    pub fn failure_delay(&self) -> Duration {
        Duration::from_millis(self.failure_delay_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            completion_delay_ms: Self::default_completion_delay_ms(),
            failure_delay_ms: Self::default_failure_delay_ms(),
            startup_delay_ms: Self::default_startup_delay_ms(),
        }
    }
}

/// Configuration for one voice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_silence_timer_ms")]
    pub silence_timer_ms: u64,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Persisted continuous-mode toggle.
    #[serde(default = "default_true")]
    pub continuous_mode: bool,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    #[serde(default = "default_responder_url")]
    pub responder_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub restart: RestartPolicy,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            silence_timer_ms: default_silence_timer_ms(),
            locale: default_locale(),
            continuous_mode: true,
            auto_start: true,
            responder_url: default_responder_url(),
            request_timeout_secs: default_request_timeout_secs(),
            restart: RestartPolicy::default(),
        }
    }
}

impl VoiceConfig {
    /// Load config. Precedence: environment (`ORBIT_*`) > file at `ORBIT_CONFIG` (default `config/orbit`) > defaults.
    pub fn load() -> VoiceResult<Self> {
        let config_path = std::env::var("ORBIT_CONFIG").unwrap_or_else(|_| "config/orbit".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load config from an explicit file path (missing file is fine) layered under the environment.
    pub fn load_from(path: &Path) -> VoiceResult<Self> {
        let defaults = VoiceConfig::default();
        let builder = config::Config::builder()
            .set_default("silence_timer_ms", defaults.silence_timer_ms as i64)?
            .set_default("locale", defaults.locale.clone())?
            .set_default("continuous_mode", defaults.continuous_mode)?
            .set_default("auto_start", defaults.auto_start)?
            .set_default("responder_url", defaults.responder_url.clone())?
            .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?;

        let builder = match path.to_str() {
            Some(name) => builder.add_source(config::File::with_name(name).required(false)),
            None => builder,
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("ORBIT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: VoiceConfig = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> VoiceResult<()> {
        if self.silence_timer_ms == 0 {
            return Err(VoiceError::Config("silence_timer_ms must be greater than zero".to_string()));
        }
        if self.locale.trim().is_empty() {
            return Err(VoiceError::Config("locale must not be empty".to_string()));
        }
        reqwest::Url::parse(self.responder_url.trim())
            .map_err(|e| VoiceError::Config(format!("responder_url '{}' is invalid: {}", self.responder_url, e)))?;
        Ok(())
    }

    pub fn silence_timer(&self) -> Duration {
        Duration::from_millis(self.silence_timer_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let c = VoiceConfig::default();
        assert_eq!(c.silence_timer(), Duration::from_millis(2000));
        assert_eq!(c.locale, "tr-TR");
        assert!(c.continuous_mode);
        assert_eq!(c.restart.completion_delay(), Duration::from_millis(1000));
        assert_eq!(c.restart.failure_delay(), Duration::from_millis(2000));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_silence_timer_is_rejected() {
        let c = VoiceConfig {
            silence_timer_ms: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(VoiceError::Config(_))));
    }

    #[test]
    fn bad_responder_url_is_rejected() {
        let c = VoiceConfig {
            responder_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(VoiceError::Config(_))));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orbit.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "silence_timer_ms = 1500\nlocale = \"en-US\"\ncontinuous_mode = false\n\n[restart]\nfailure_delay_ms = 3000"
        )
        .unwrap();

        let c = VoiceConfig::load_from(&path).unwrap();
        assert_eq!(c.silence_timer_ms, 1500);
        assert_eq!(c.locale, "en-US");
        assert!(!c.continuous_mode);
        assert_eq!(c.restart.failure_delay_ms, 3000);
        assert_eq!(c.restart.completion_delay_ms, 1000);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = VoiceConfig::load_from(&dir.path().join("absent")).unwrap();
        assert_eq!(c.silence_timer_ms, 2000);
    }
}
