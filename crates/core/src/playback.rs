//! Per-message text-to-speech playback.
//!
//! Each playable message gets its own [`PlaybackEngine`], which walks
//! `Idle → Loading → Playing → Idle`. A `play` request is only accepted in
//! `Idle`; anything else is refused without side effects.

use crate::audio::{
    AudioDecodeError, SPEECH_CHANNEL_COUNT, SPEECH_PCM16_SAMPLE_RATE, decode_base64_pcm16,
};
use crate::message::{Message, MessageId, Role};
use crate::output::{AudioOutput, Completion, OutputContext};
use crate::speech::SpeechSynthesizer;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Shown to the user whenever playback fails.
pub const PLAYBACK_FAILURE_NOTICE: &str = "오디오 재생에 실패했습니다.";

/// How long a playback without a completion signal counts as playing.
pub const DEFAULT_PLAYBACK_COOLDOWN: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("speech synthesis timed out after {0:?}")]
    Timeout(Duration),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("speech API returned no audio")]
    NoAudio,
    #[error(transparent)]
    Decode(#[from] AudioDecodeError),
    #[error("audio output failed: {0}")]
    Output(String),
}

impl PlaybackError {
    pub fn user_message(&self) -> &'static str {
        PLAYBACK_FAILURE_NOTICE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Audio was scheduled on a fresh output context.
    Started,
    /// The request was ignored: the engine was busy or the message is not
    /// playable.
    Refused,
}

#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    /// Fallback wait before returning to idle when the backend cannot report
    /// the end of playback.
    pub cooldown: Duration,
    /// Upper bound on the synthesis call. `None` waits forever.
    pub synthesis_timeout: Option<Duration>,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_PLAYBACK_COOLDOWN,
            synthesis_timeout: Some(Duration::from_secs(60)),
        }
    }
}

pub struct PlaybackEngine {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    options: PlaybackOptions,
    state: Arc<watch::Sender<PlaybackState>>,
}

/// Puts the engine back to idle if loading is abandoned before playback
/// starts, including when the `play` future is dropped.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<PlaybackState>,
    armed: bool,
}

impl LoadingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(PlaybackState::Idle);
        }
    }
}

impl PlaybackEngine {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        options: PlaybackOptions,
    ) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            synthesizer,
            output,
            options,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    /// Synthesizes `text` and plays it.
    ///
    /// Returns once playback has been scheduled; the engine goes back to idle
    /// on its own afterwards. On failure the engine is already idle again when
    /// the error is returned.
    pub async fn play(&self, text: &str) -> Result<PlayOutcome, PlaybackError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == PlaybackState::Idle {
                *state = PlaybackState::Loading;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!(state = ?self.state(), "Playback request refused");
            return Ok(PlayOutcome::Refused);
        }

        let guard = LoadingGuard {
            state: &self.state,
            armed: true,
        };
        let (context, completion, duration) = match self.load(text).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Speech playback failed");
                return Err(e);
            }
        };
        guard.disarm();
        self.state.send_replace(PlaybackState::Playing);
        info!(duration_ms = duration.as_millis() as u64, "Speech playback started");

        let state = Arc::clone(&self.state);
        let cooldown = self.options.cooldown;
        tokio::spawn(async move {
            match completion {
                Some(done) => {
                    if tokio::time::timeout(duration + cooldown, done).await.is_err() {
                        warn!("No end-of-playback signal; releasing output context");
                    }
                }
                None => tokio::time::sleep(cooldown).await,
            }
            drop(context);
            state.send_replace(PlaybackState::Idle);
        });

        Ok(PlayOutcome::Started)
    }

    async fn load(
        &self,
        text: &str,
    ) -> Result<(Box<dyn OutputContext>, Option<Completion>, Duration), PlaybackError> {
        let synthesis = self.synthesizer.synthesize(text);
        let audio = match self.options.synthesis_timeout {
            Some(limit) => tokio::time::timeout(limit, synthesis)
                .await
                .map_err(|_| PlaybackError::Timeout(limit))??,
            None => synthesis.await?,
        };

        let buffer = decode_base64_pcm16(&audio, SPEECH_PCM16_SAMPLE_RATE, SPEECH_CHANNEL_COUNT)?;
        if buffer.is_empty() {
            return Err(PlaybackError::NoAudio);
        }

        let mut context = self
            .output
            .open(buffer.sample_rate(), buffer.channel_count())?;
        let completion = context.start(&buffer).await?;
        Ok((context, completion, buffer.duration()))
    }
}

/// Lazily creates one [`PlaybackEngine`] per message.
pub struct PlaybackBoard {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    options: PlaybackOptions,
    engines: Mutex<HashMap<MessageId, Arc<PlaybackEngine>>>,
}

impl PlaybackBoard {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        options: PlaybackOptions,
    ) -> Self {
        Self {
            synthesizer,
            output,
            options,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Plays a finalized model message. User messages and the pending
    /// placeholder are refused.
    pub async fn play(&self, message: &Message) -> Result<PlayOutcome, PlaybackError> {
        if message.role() != Role::Model || message.is_pending() {
            return Ok(PlayOutcome::Refused);
        }
        let engine = self.engine_for(message.id());
        engine.play(message.text()).await
    }

    pub fn state(&self, id: MessageId) -> PlaybackState {
        self.engines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map_or(PlaybackState::Idle, |engine| engine.state())
    }

    fn engine_for(&self, id: MessageId) -> Arc<PlaybackEngine> {
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(engines.entry(id).or_insert_with(|| {
            Arc::new(PlaybackEngine::new(
                Arc::clone(&self.synthesizer),
                Arc::clone(&self.output),
                self.options.clone(),
            ))
        }))
    }
}
