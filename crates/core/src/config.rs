use crate::playback::{DEFAULT_PLAYBACK_COOLDOWN, PlaybackOptions};
use crate::session::SessionOptions;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::Level;

/// Credential variables, highest precedence first.
pub const API_KEY_VARS: [&str; 3] = ["VITE_VAIT_API_KEY", "GEMINI_API_KEY", "API_KEY"];

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    /// `None` when no credential variable is set. Calls then fail with a
    /// missing-credential error instead of the process refusing to start.
    pub api_key: Option<SecretString>,
    pub api_base: String,
    pub chat_model: String,
    pub speech_model: String,
    pub reply_timeout: Option<Duration>,
    pub speech_timeout: Option<Duration>,
    pub playback_cooldown: Duration,
    pub log_level: Level,
}

/// Returns the first non-empty credential in [`API_KEY_VARS`] order.
pub fn resolve_api_key(lookup: impl Fn(&str) -> Option<String>) -> Option<SecretString> {
    API_KEY_VARS
        .iter()
        .filter_map(|&name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .map(SecretString::from)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Reads a whole-seconds timeout. Unset means the default, `0` disables it.
fn timeout_secs(name: &str) -> Result<Option<Duration>, ConfigError> {
    match env_var(name) {
        None => Ok(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS))),
        Some(raw) => {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))?;
            Ok((secs > 0).then(|| Duration::from_secs(secs)))
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // .env is only read outside tests.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_key = resolve_api_key(env_var);

        let api_base = env_var("ENGBUDDY_API_BASE")
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let chat_model =
            env_var("ENGBUDDY_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let speech_model =
            env_var("ENGBUDDY_SPEECH_MODEL").unwrap_or_else(|| DEFAULT_SPEECH_MODEL.to_string());

        let reply_timeout = timeout_secs("ENGBUDDY_REPLY_TIMEOUT_SECS")?;
        let speech_timeout = timeout_secs("ENGBUDDY_SPEECH_TIMEOUT_SECS")?;

        let playback_cooldown = match env_var("ENGBUDDY_PLAYBACK_COOLDOWN_MS") {
            None => DEFAULT_PLAYBACK_COOLDOWN,
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| {
                    ConfigError::InvalidValue("ENGBUDDY_PLAYBACK_COOLDOWN_MS".to_string(), e.to_string())
                })?,
        };

        let log_level_str = env_var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_key,
            api_base,
            chat_model,
            speech_model,
            reply_timeout,
            speech_timeout,
            playback_cooldown,
            log_level,
        })
    }

    /// Copy of the credential for handing to one client.
    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key
            .as_ref()
            .map(|key| SecretString::from(key.expose_secret().to_string()))
    }

    /// Base URL of the OpenAI-compatible chat surface.
    pub fn chat_api_base(&self) -> String {
        format!("{}/openai", self.api_base)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            reply_timeout: self.reply_timeout,
            ..SessionOptions::default()
        }
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            cooldown: self.playback_cooldown,
            synthesis_timeout: self.speech_timeout,
        }
    }
}
