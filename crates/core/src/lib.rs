//! EngBuddy core.
//!
//! Conversation state and text-to-speech playback for the EngBuddy English
//! tutor. The rendering layer reads the log from a [`ConversationSession`],
//! sends input through [`ConversationSession::submit`] and plays replies
//! through a [`PlaybackBoard`]. Both talk to the hosted model only through the
//! [`ChatTransport`] and [`SpeechSynthesizer`] traits.

pub mod audio;
pub mod chat;
pub mod config;
pub mod message;
pub mod output;
pub mod playback;
pub mod prompts;
pub mod quick_actions;
pub mod session;
pub mod speech;

pub use chat::{ChatTransport, ChatTransportError, GeminiChatClient};
pub use config::Config;
pub use message::{HistoryTurn, Message, MessageId, Role};
pub use playback::{PlayOutcome, PlaybackBoard, PlaybackEngine, PlaybackError, PlaybackState};
pub use session::{ConversationSession, SessionEvent, SessionOptions, SubmitOutcome};
pub use speech::{GeminiSpeechClient, SpeechSynthesizer};
