//! Conversation transcript model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open key/value metadata attached to conversations and messages.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Speaker of a context turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person asking.
    User,
    /// The generation backend answering.
    Model,
}

impl Role {
    /// Stable string form, as understood by the generation backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One entry of the history handed back to the generation backend.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContextTurn {
    /// Who said it.
    pub role: Role,
    /// What was said.
    pub text: String,
}

impl ContextTurn {
    /// Build a user turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Build a model turn.
    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A stored exchange: one query and the response it received.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The user's query.
    pub query: String,
    /// The generated response.
    pub response: String,
    /// When the exchange was stored.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata.
    pub metadata: Metadata,
}

/// A dialogue transcript keyed by an opaque identifier.
///
/// Values handed out by the store are snapshots; the store keeps the only
/// mutable copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    id: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    metadata: Metadata,
}

impl Conversation {
    pub(crate) fn new(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            messages: Vec::new(),
            created_at: now,
            last_accessed: now,
            metadata: Metadata::new(),
        }
    }

    /// Conversation identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Messages in chronological order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last read or write.
    #[must_use]
    pub const fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    /// Conversation-level metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Most recent message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// History for the generation backend: a user turn and a model turn per
    /// message, oldest first, limited to the last `last_n` messages (`0` means all).
    #[must_use]
    pub fn context(&self, last_n: usize) -> Vec<ContextTurn> {
        let start = if last_n == 0 {
            0
        } else {
            self.messages.len().saturating_sub(last_n)
        };

        self.messages[start..]
            .iter()
            .flat_map(|message| {
                [
                    ContextTurn::user(message.query.as_str()),
                    ContextTurn::model(message.response.as_str()),
                ]
            })
            .collect()
    }

    /// Record activity. Access time never moves backwards.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed {
            self.last_accessed = now;
        }
    }

    pub(crate) fn push(
        &mut self,
        query: String,
        response: String,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) {
        // Keep message timestamps non-decreasing even if the wall clock steps back.
        let timestamp = self
            .messages
            .last()
            .map_or(now, |last| last.timestamp.max(now));

        self.messages.push(Message {
            query,
            response,
            timestamp,
            metadata,
        });
        self.touch(now);
    }
}
