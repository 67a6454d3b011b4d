//! Non-streaming query path. Stateless: nothing is stored.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chat::error::{ChatError, ChatResult};
use crate::llm::backend::GenerationBackend;

/// Longest accepted query, in characters.
pub const MAX_QUERY_CHARS: usize = 4000;

/// Text returned when the backend answers with nothing.
const NO_RESPONSE: &str = "No response generated";

/// Check a query before it reaches the store or the backend.
///
/// # Errors
/// Returns a validation error if the query is empty, whitespace only, or longer
/// than [`MAX_QUERY_CHARS`].
pub fn validate_query(query: &str) -> ChatResult<()> {
    if query.trim().is_empty() {
        return Err(ChatError::Validation("Query cannot be empty".to_string()));
    }

    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(ChatError::Validation(format!(
            "Query must be at most {MAX_QUERY_CHARS} characters"
        )));
    }

    Ok(())
}

/// Fail fast when the backend is not configured.
///
/// # Errors
/// Returns a configuration error if the backend cannot serve requests.
pub fn ensure_configured(backend: &dyn GenerationBackend) -> ChatResult<()> {
    if backend.is_configured() {
        Ok(())
    } else {
        Err(ChatError::Configuration(
            "AI service is not configured. Please check API key settings.".to_string(),
        ))
    }
}

/// Token usage estimate: whitespace-separated words, not backend tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Words in the query.
    pub prompt_tokens: usize,
    /// Words in the response.
    pub completion_tokens: usize,
    /// Sum of both.
    pub total_tokens: usize,
}

impl Usage {
    /// Estimate usage for a query and its response.
    #[must_use]
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = prompt.split_whitespace().count();
        let completion_tokens = completion.split_whitespace().count();
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Answer to a non-streaming query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Generated text.
    pub response: String,
    /// Model that produced it.
    pub model: String,
    /// Estimated usage.
    pub usage: Usage,
}

/// One-shot query service.
#[derive(Clone)]
pub struct QueryService {
    backend: Arc<dyn GenerationBackend>,
}

impl QueryService {
    /// Create a service over `backend`.
    #[must_use]
    pub const fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Generate a complete answer for `query`.
    ///
    /// # Errors
    /// Returns a configuration error if the backend is not configured, a
    /// validation error for a bad query, or a backend error if generation fails.
    pub async fn answer(&self, query: &str) -> ChatResult<QueryOutcome> {
        ensure_configured(self.backend.as_ref())?;
        validate_query(query)?;

        debug!(chars = query.chars().count(), "Received query");

        let backend = Arc::clone(&self.backend);
        let prompt = query.to_string();
        let generation = tokio::task::spawn_blocking(move || backend.generate_once(&prompt))
            .await
            .map_err(|err| ChatError::Internal(format!("generation task failed: {err}")))??;

        let response = if generation.text.is_empty() {
            NO_RESPONSE.to_string()
        } else {
            generation.text
        };
        let usage = Usage::estimate(query, &response);

        info!(
            model = %generation.model,
            completion_tokens = usage.completion_tokens,
            "Generated response"
        );

        Ok(QueryOutcome {
            response,
            model: generation.model,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::backend::GenerationInput;
    use crate::llm::scripted::ScriptedBackend;

    #[test]
    fn test_validate_query_bounds() {
        assert!(validate_query("hello").is_ok());
        assert!(validate_query(&"a".repeat(MAX_QUERY_CHARS)).is_ok());

        assert!(matches!(validate_query(""), Err(ChatError::Validation(_))));
        assert!(matches!(validate_query("   \n\t"), Err(ChatError::Validation(_))));
        assert!(matches!(
            validate_query(&"a".repeat(MAX_QUERY_CHARS + 1)),
            Err(ChatError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_counts_chars_not_bytes() {
        let query = "é".repeat(MAX_QUERY_CHARS);
        assert!(query.len() > MAX_QUERY_CHARS);
        assert!(validate_query(&query).is_ok());
    }

    #[test]
    fn test_usage_estimate() {
        let usage = Usage::estimate("What is the capital of France?", "Paris.");
        assert_eq!(usage.prompt_tokens, 6);
        assert_eq!(usage.completion_tokens, 1);
        assert_eq!(usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn test_answer_returns_generation() {
        let backend = Arc::new(ScriptedBackend::fragments(&[]).with_reply(Ok("Paris is the capital.")));
        let service = QueryService::new(backend.clone());

        let outcome = service.answer("Capital of France?").await.unwrap();

        assert_eq!(outcome.response, "Paris is the capital.");
        assert_eq!(outcome.model, "scripted-model");
        assert_eq!(outcome.usage.total_tokens, 3 + 4);
        assert_eq!(
            backend.inputs(),
            vec![GenerationInput::Prompt("Capital of France?".to_string())]
        );
    }

    #[tokio::test]
    async fn test_answer_placeholder_for_empty_generation() {
        let backend = Arc::new(ScriptedBackend::fragments(&[]).with_reply(Ok("")));
        let service = QueryService::new(backend);

        let outcome = service.answer("anything").await.unwrap();
        assert_eq!(outcome.response, NO_RESPONSE);
    }

    #[tokio::test]
    async fn test_answer_unconfigured_is_configuration_error() {
        let backend = Arc::new(ScriptedBackend::unconfigured());
        let service = QueryService::new(backend.clone());

        let result = service.answer("hello").await;
        assert!(matches!(result, Err(ChatError::Configuration(_))));
        assert!(backend.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_answer_rejects_blank_query_before_backend() {
        let backend = Arc::new(ScriptedBackend::fragments(&["x"]));
        let service = QueryService::new(backend.clone());

        let result = service.answer("   ").await;
        assert!(matches!(result, Err(ChatError::Validation(_))));
        assert!(backend.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_answer_backend_failure() {
        let backend = Arc::new(ScriptedBackend::fragments(&[]).with_reply(Err("quota exceeded")));
        let service = QueryService::new(backend);

        let result = service.answer("hello").await;
        assert!(matches!(result, Err(ChatError::Backend(_))));
    }
}
