//! Shared front-end state, built once at startup.

use engbuddy_core::{
    Config, ConversationSession, GeminiChatClient, GeminiSpeechClient, PlaybackBoard,
    output::AudioOutput,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<ConversationSession>,
    pub playback: Arc<PlaybackBoard>,
    /// `false` when synthesized speech is decoded but not played anywhere.
    pub audible: bool,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let chat = GeminiChatClient::new(
            config.api_key(),
            &config.chat_api_base(),
            config.chat_model.clone(),
        );
        let speech = GeminiSpeechClient::new(
            config.api_key(),
            &config.api_base,
            config.speech_model.clone(),
        );

        let output = audio_output();
        let audible = output.is_audible();
        let session = ConversationSession::new(Arc::new(chat), config.session_options());
        let playback = PlaybackBoard::new(Arc::new(speech), output, config.playback_options());

        Self {
            session: Arc::new(session),
            playback: Arc::new(playback),
            audible,
        }
    }
}

#[cfg(feature = "speaker")]
fn audio_output() -> Arc<dyn AudioOutput> {
    tracing::info!("Playing speech on the default output device.");
    Arc::new(engbuddy_core::output::SpeakerOutput)
}

#[cfg(not(feature = "speaker"))]
fn audio_output() -> Arc<dyn AudioOutput> {
    tracing::warn!("Built without the `speaker` feature; synthesized speech is not played.");
    Arc::new(engbuddy_core::output::DiscardOutput)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engbuddy_core::config::{DEFAULT_API_BASE, DEFAULT_CHAT_MODEL, DEFAULT_SPEECH_MODEL};
    use std::time::Duration;
    use tracing::Level;

    fn test_config() -> Config {
        Config {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            reply_timeout: None,
            speech_timeout: None,
            playback_cooldown: Duration::from_secs(3),
            log_level: Level::INFO,
        }
    }

    #[test]
    fn test_audible_matches_build() {
        let state = AppState::from_config(&test_config());
        assert_eq!(state.audible, cfg!(feature = "speaker"));
        assert_eq!(state.session.len(), 1, "seeded with the welcome message");
    }

    #[cfg(feature = "speaker")]
    #[test]
    fn test_default_build_plays_on_speaker() {
        assert!(audio_output().is_audible());
    }

    #[cfg(not(feature = "speaker"))]
    #[test]
    fn test_headless_build_discards_speech() {
        assert!(!audio_output().is_audible());
    }
}
