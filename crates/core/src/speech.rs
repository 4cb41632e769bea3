//! Text-to-speech through Gemini's `generateContent` endpoint.

use crate::playback::PlaybackError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};

/// Prebuilt voice used for every synthesis request.
pub const SPEECH_VOICE: &str = "Puck";

// --- Local Gemini wire types ---
mod gemini_speech_types {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerateContentRequest {
        pub contents: Vec<Content>,
        pub generation_config: GenerationConfig,
    }
    #[derive(Serialize)]
    pub(super) struct Content {
        pub parts: Vec<Part>,
    }
    #[derive(Serialize)]
    pub(super) struct Part {
        pub text: String,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerationConfig {
        pub response_modalities: Vec<ResponseModality>,
        pub speech_config: SpeechConfig,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub(super) enum ResponseModality {
        Audio,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct SpeechConfig {
        pub voice_config: VoiceConfig,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct VoiceConfig {
        pub prebuilt_voice_config: PrebuiltVoiceConfig,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct PrebuiltVoiceConfig {
        pub voice_name: String,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct GenerateContentResponse {
        #[serde(default)]
        pub candidates: Vec<Candidate>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct Candidate {
        pub content: Option<CandidateContent>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct CandidateContent {
        #[serde(default)]
        pub parts: Vec<ResponsePart>,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ResponsePart {
        pub inline_data: Option<Blob>,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Blob {
        pub mime_type: Option<String>,
        pub data: String,
    }
}

use gemini_speech_types::*;

/// Turns text into base64 PCM16 audio (24 kHz, mono).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<String, PlaybackError>;
}

pub struct GeminiSpeechClient {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    api_base: String,
    model: String,
}

impl GeminiSpeechClient {
    /// `api_base` is the root of the native API, e.g.
    /// `https://generativelanguage.googleapis.com/v1beta`.
    pub fn new(api_key: Option<SecretString>, api_base: &str, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

fn speech_request(text: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: text.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            response_modalities: vec![ResponseModality::Audio],
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: SPEECH_VOICE.to_string(),
                    },
                },
            },
        },
    }
}

/// Finds the first inline audio blob of the first candidate.
fn extract_audio(response: GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .find_map(|part| part.inline_data)
        .map(|blob| {
            debug!(mime_type = ?blob.mime_type, bytes = blob.data.len(), "Received speech audio");
            blob.data
        })
        .filter(|data| !data.is_empty())
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeechClient {
    async fn synthesize(&self, text: &str) -> Result<String, PlaybackError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(PlaybackError::MissingCredential)?;

        let res = self
            .http
            .post(self.endpoint())
            .query(&[("key", api_key.expose_secret())])
            .json(&speech_request(text))
            .send()
            .await
            .map_err(|e| PlaybackError::Synthesis(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            error!(%status, "Speech API returned an error");
            return Err(PlaybackError::Synthesis(format!(
                "speech API error {}: {}",
                status, body
            )));
        }

        let response: GenerateContentResponse = res
            .json()
            .await
            .map_err(|e| PlaybackError::Synthesis(e.to_string()))?;
        extract_audio(response).ok_or(PlaybackError::NoAudio)
    }
}
