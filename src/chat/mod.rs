//! Chat services on top of the conversation store and the generation backend.
//!
//! - `query`: stateless one-shot answers
//! - `bridge`: streamed answers committed to a conversation

pub mod bridge;
pub mod error;
pub mod query;

pub use bridge::{BridgeEvent, BridgeStream, CONTEXT_TURNS, StreamBridge};
pub use error::{ChatError, ChatResult};
pub use query::{MAX_QUERY_CHARS, QueryOutcome, QueryService, Usage, ensure_configured, validate_query};
