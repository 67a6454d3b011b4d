//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::bridge::StreamBridge;
use crate::chat::query::QueryService;
use crate::conversation::store::ConversationStore;
use crate::llm::backend::GenerationBackend;

/// Shared application state.
pub struct AppState {
    /// Conversation store.
    pub store: Arc<ConversationStore>,
    /// Generation backend.
    pub backend: Arc<dyn GenerationBackend>,
    /// Streaming path.
    pub bridge: StreamBridge,
    /// Non-streaming path.
    pub query: QueryService,
}

impl AppState {
    /// Wire the services around an explicitly constructed store and backend.
    #[must_use]
    pub fn new(store: Arc<ConversationStore>, backend: Arc<dyn GenerationBackend>) -> Arc<Self> {
        let bridge = StreamBridge::new(Arc::clone(&store), Arc::clone(&backend));
        let query = QueryService::new(Arc::clone(&backend));

        Arc::new(Self {
            store,
            backend,
            bridge,
            query,
        })
    }
}
