//! Conversation data model.
//!
//! Messages are created by the session and handed out to the rendering layer
//! as read-only snapshots. The only mutation a message ever sees is the single
//! pending → final transition performed by [`Message::finalize`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a message within one session.
///
/// Ids come from a per-session counter, so a later message always has a
/// larger id than an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    text: String,
    created_at: DateTime<Utc>,
    pending: bool,
}

impl Message {
    pub(crate) fn new(id: MessageId, role: Role, text: impl Into<String>) -> Self {
        Self {
            id,
            role,
            text: text.into(),
            created_at: Utc::now(),
            pending: false,
        }
    }

    /// Creates the empty model placeholder shown while a reply is in flight.
    pub(crate) fn placeholder(id: MessageId) -> Self {
        Self {
            pending: true,
            ..Self::new(id, Role::Model, String::new())
        }
    }

    /// Sets the final text of a pending message.
    ///
    /// Returns `false` and leaves the message untouched if it was already
    /// finalized, so a placeholder can never be resolved twice.
    pub(crate) fn finalize(&mut self, text: impl Into<String>) -> bool {
        if !self.pending {
            return false;
        }
        self.text = text.into();
        self.pending = false;
        true
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

/// A single prior turn as sent to the chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl From<&Message> for HistoryTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            text: message.text.clone(),
        }
    }
}

/// Projects a log onto the turns the chat model should see.
///
/// Pending placeholders and the seed message are skipped wherever they appear.
pub fn request_history(log: &[Message], seed: Option<MessageId>) -> Vec<HistoryTurn> {
    log.iter()
        .filter(|m| !m.pending && Some(m.id) != seed)
        .map(HistoryTurn::from)
        .collect()
}
