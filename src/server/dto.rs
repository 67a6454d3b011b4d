//! Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::bridge::BridgeEvent;
use crate::chat::query::{QueryOutcome, Usage};
use crate::conversation::types::{Conversation, Message, Metadata};

/// Non-streaming query request.
#[derive(Debug, Deserialize, Serialize)]
pub struct QueryRequest {
    /// The question or prompt.
    pub query: String,
}

/// Streaming query request.
#[derive(Debug, Deserialize, Serialize)]
pub struct StreamingQueryRequest {
    /// The question or prompt.
    pub query: String,
    /// Conversation to continue. A new one is created when absent.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Non-streaming query response.
#[derive(Debug, Deserialize, Serialize)]
pub struct QueryResponse {
    /// Generated text.
    pub response: String,
    /// Model that produced it.
    pub model: String,
    /// Estimated usage.
    pub usage: Usage,
}

impl From<QueryOutcome> for QueryResponse {
    fn from(outcome: QueryOutcome) -> Self {
        Self {
            response: outcome.response,
            model: outcome.model,
            usage: outcome.usage,
        }
    }
}

/// One server-sent-events frame of a streamed response.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StreamingChunk {
    /// Fragment text; empty on the final frame.
    pub text: String,
    /// Model generating the response.
    pub model: String,
    /// Conversation the frame belongs to.
    pub conversation_id: Option<String>,
    /// Whether this is the final frame.
    pub done: bool,
    /// Failure description, only on a failed final frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamingChunk {
    /// Render a bridge event as a frame.
    #[must_use]
    pub fn from_event(event: BridgeEvent, model: &str, conversation_id: &str) -> Self {
        let (text, done, error) = match event {
            BridgeEvent::Fragment { text } => (text, false, None),
            BridgeEvent::Completed { .. } => (String::new(), true, None),
            BridgeEvent::Failed { error, .. } => (String::new(), true, Some(error)),
        };

        Self {
            text,
            model: model.to_string(),
            conversation_id: Some(conversation_id.to_string()),
            done,
            error,
        }
    }
}

/// Liveness response.
#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    /// Always `healthy`.
    pub status: String,
    /// Human readable message.
    pub message: String,
    /// Crate version.
    pub version: String,
}

/// Generation service status.
#[derive(Debug, Deserialize, Serialize)]
pub struct ServiceStatusResponse {
    /// `available` or `unavailable`.
    pub status: String,
    /// Whether the backend is configured.
    pub configured: bool,
    /// Model in use, when configured.
    pub model: Option<String>,
    /// Human readable message.
    pub message: String,
}

/// Stored exchange as rendered by the API.
#[derive(Debug, Deserialize, Serialize)]
pub struct MessageView {
    /// The user's query.
    pub query: String,
    /// The stored response.
    pub response: String,
    /// When it was stored.
    pub timestamp: DateTime<Utc>,
    /// Message metadata.
    pub metadata: Metadata,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            query: message.query.clone(),
            response: message.response.clone(),
            timestamp: message.timestamp,
            metadata: message.metadata.clone(),
        }
    }
}

/// Conversation history as rendered by the API.
#[derive(Debug, Deserialize, Serialize)]
pub struct ConversationView {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last read or write.
    pub last_accessed: DateTime<Utc>,
    /// Number of stored messages.
    pub message_count: usize,
    /// Conversation metadata.
    pub metadata: Metadata,
    /// Messages, oldest first.
    pub messages: Vec<MessageView>,
}

impl From<Conversation> for ConversationView {
    fn from(conversation: Conversation) -> Self {
        Self {
            conversation_id: conversation.id().to_string(),
            created_at: conversation.created_at(),
            last_accessed: conversation.last_accessed(),
            message_count: conversation.message_count(),
            metadata: conversation.metadata().clone(),
            messages: conversation.messages().iter().map(MessageView::from).collect(),
        }
    }
}

/// Error body.
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    /// Machine readable error kind.
    pub error: String,
    /// Human readable description.
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_frame() {
        let chunk = StreamingChunk::from_event(
            BridgeEvent::Fragment {
                text: "Hel".to_string(),
            },
            "m",
            "c-1",
        );
        let json = serde_json::to_value(&chunk).unwrap();

        assert_eq!(json["text"], "Hel");
        assert_eq!(json["done"], false);
        assert_eq!(json["conversation_id"], "c-1");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_frame_carries_error() {
        let chunk = StreamingChunk::from_event(
            BridgeEvent::Failed {
                conversation_id: "c-1".to_string(),
                error: "boom".to_string(),
            },
            "m",
            "c-1",
        );

        assert!(chunk.done);
        assert!(chunk.text.is_empty());
        assert_eq!(chunk.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_streaming_request_id_is_optional() {
        let request: StreamingQueryRequest = serde_json::from_str(r#"{"query":"hi"}"#).unwrap();
        assert!(request.conversation_id.is_none());
    }
}
