//! Generation backends.
//!
//! - `backend`: the blocking backend trait and its value types
//! - `gemini`: Gemini REST implementation
//! - `error`: backend error taxonomy

pub mod backend;
pub mod error;
pub mod gemini;

#[cfg(test)]
pub(crate) mod scripted;

pub use backend::{Fragment, FragmentStream, Generation, GenerationBackend, GenerationInput};
pub use error::{BackendError, BackendResult};
pub use gemini::{GeminiClient, GeminiConfig, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
