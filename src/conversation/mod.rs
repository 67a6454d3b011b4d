//! Conversation memory for the relay.
//!
//! - `types`: transcript model (conversations, messages, context turns)
//! - `config`: capacity, idle age and sweep cadence
//! - `store`: the bounded, thread-safe store and its eviction policy
//! - `reaper`: background worker driving periodic eviction

pub mod config;
pub mod errors;
pub mod ids;
pub mod reaper;
pub mod store;
pub mod types;

pub use config::{StoreConfig, StoreConfigBuilder};
pub use errors::{StoreError, StoreResult};
pub use ids::new_conversation_id;
pub use reaper::{Reaper, ReaperHandle};
pub use store::{ConversationStore, StoreStats};
pub use types::{ContextTurn, Conversation, Message, Metadata, Role};
