//! Generation backend abstraction.
//!
//! Backends are blocking: callers on an async runtime run them on the blocking
//! pool (`tokio::task::spawn_blocking`).

use crate::conversation::types::ContextTurn;
use crate::llm::error::BackendResult;

/// Result of a one-shot generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
    /// Generated text.
    pub text: String,
    /// Model that produced it.
    pub model: String,
}

/// One piece of a streamed generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// Text carried by this fragment. May be empty.
    pub text: String,
}

impl Fragment {
    /// Build a fragment.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// What to generate from: a bare prompt or a history ending with the new user turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationInput {
    /// Single prompt without prior context.
    Prompt(String),
    /// Prior turns, oldest first, ending with the new user turn.
    History(Vec<ContextTurn>),
}

/// Blocking sequence of fragments. Each item may fail, ending the sequence.
pub type FragmentStream = Box<dyn Iterator<Item = BackendResult<Fragment>> + Send>;

/// A text generation backend.
pub trait GenerationBackend: Send + Sync {
    /// Name of the model in use.
    fn model_name(&self) -> &str;

    /// Whether the backend has what it needs to serve requests.
    fn is_configured(&self) -> bool;

    /// Generate a complete response for `prompt`.
    ///
    /// # Errors
    /// Returns an error if the backend is not configured or the call fails.
    fn generate_once(&self, prompt: &str) -> BackendResult<Generation>;

    /// Start a streamed generation.
    ///
    /// # Errors
    /// Returns an error if the stream cannot be opened. Failures after the
    /// stream has started surface as `Err` items.
    fn generate_streaming(&self, input: GenerationInput) -> BackendResult<FragmentStream>;
}
