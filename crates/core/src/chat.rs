//! Chat transport toward the hosted language model.
//!
//! The transport is stateless: every call carries the full prior history, the
//! tutor persona and the new utterance. Provider errors are flattened into
//! [`ChatTransportError`] so nothing above this module depends on the client
//! library's error shapes.

use crate::message::{HistoryTurn, Role};
use crate::prompts::SYSTEM_INSTRUCTION;
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, error};

/// Sampling temperature used for every tutoring reply.
pub const CHAT_TEMPERATURE: f32 = 0.7;

/// Returned in place of an answer when the model produced no text.
pub const EMPTY_REPLY_FALLBACK: &str = "죄송합니다. 답변을 생성하지 못했습니다.";

/// What the user is told when the chat call fails, whatever the cause.
pub const CHAT_FAILURE_NOTICE: &str = "AI 응답을 가져오는 중 오류가 발생했습니다.";

#[derive(Debug, thiserror::Error)]
pub enum ChatTransportError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("chat request timed out after {0:?}")]
    Timeout(Duration),
    #[error("chat request failed: {0}")]
    Request(String),
}

impl ChatTransportError {
    /// The localized message shown to the user. Never contains the cause.
    pub fn user_message(&self) -> &'static str {
        CHAT_FAILURE_NOTICE
    }
}

impl From<OpenAIError> for ChatTransportError {
    fn from(err: OpenAIError) -> Self {
        ChatTransportError::Request(err.to_string())
    }
}

/// Sends one user utterance, with its context, to the chat model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Returns the model's reply text, or the empty-reply fallback when the
    /// model answered without text.
    async fn send(
        &self,
        history: Vec<HistoryTurn>,
        message: String,
    ) -> Result<String, ChatTransportError>;
}

/// A [`ChatTransport`] for Gemini's OpenAI-compatible chat endpoint.
pub struct GeminiChatClient {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl GeminiChatClient {
    /// Creates a client. A missing key is accepted here and reported as
    /// [`ChatTransportError::MissingCredential`] on the first call.
    pub fn new(api_key: Option<SecretString>, api_base: &str, model: impl Into<String>) -> Self {
        let client = api_key.map(|key| {
            Client::with_config(
                OpenAIConfig::new()
                    .with_api_key(key.expose_secret())
                    .with_api_base(api_base),
            )
        });
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Builds the completion request: persona first, then prior turns, then the
/// new utterance.
pub fn build_request(
    model: &str,
    history: &[HistoryTurn],
    message: &str,
) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 2);
    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_INSTRUCTION)
            .build()?
            .into(),
    );
    for turn in history {
        match turn.role {
            Role::User => messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.text.clone())
                    .build()?
                    .into(),
            ),
            Role::Model => messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.text.clone())
                    .build()?
                    .into(),
            ),
        }
    }
    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(message)
            .build()?
            .into(),
    );

    CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(messages)
        .temperature(CHAT_TEMPERATURE)
        .build()
}

/// Picks the usable reply text out of the first choice's content.
pub fn reply_text(content: Option<String>) -> String {
    content
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| EMPTY_REPLY_FALLBACK.to_string())
}

#[async_trait]
impl ChatTransport for GeminiChatClient {
    async fn send(
        &self,
        history: Vec<HistoryTurn>,
        message: String,
    ) -> Result<String, ChatTransportError> {
        let client = self
            .client
            .as_ref()
            .ok_or(ChatTransportError::MissingCredential)?;
        let request = build_request(&self.model, &history, &message)?;

        debug!(model = %self.model, turns = history.len(), "Sending chat request");
        let response = client.chat().create(request).await.map_err(|e| {
            error!(error = %e, "Chat request failed");
            ChatTransportError::from(e)
        })?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        Ok(reply_text(content))
    }
}
