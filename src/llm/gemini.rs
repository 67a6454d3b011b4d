//! Blocking Gemini REST client.
//!
//! Behaviour:
//! - One-shot generation via `POST {base}/v1beta/models/{model}:generateContent`.
//! - Streaming via `:streamGenerateContent?alt=sse`, read line by line from the
//!   response body and yielded as fragments.
//! - The API key travels in the `x-goog-api-key` header.
//!
//! The underlying `reqwest::blocking::Client` must be built and dropped outside
//! of an async runtime; calls are made from the blocking pool.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conversation::types::ContextTurn;
use crate::llm::backend::{
    Fragment, FragmentStream, Generation, GenerationBackend, GenerationInput,
};
use crate::llm::error::{BackendError, BackendResult};

/// Default model name.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";

/// Default API host.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// API version path segment.
const API_VERSION: &str = "v1beta";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection establishment timeout. Generations themselves are not bounded.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Harm categories blocked at medium probability and above.
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HARASSMENT",
];

const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";

/// Finish reasons that mean the candidate was withheld or cut short.
const BLOCKING_FINISH_REASONS: [&str; 6] = [
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "OTHER",
];

/// Gemini backend settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeminiConfig {
    /// API key. Without one the backend reports itself as not configured.
    pub api_key: Option<String>,
    /// Model name.
    pub model: String,
    /// API host, without version segment.
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }
}

impl GeminiConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if the model is empty or the base URL is invalid.
    pub fn validate(&self) -> BackendResult<()> {
        if self.model.trim().is_empty() {
            return Err(BackendError::InvalidConfig(
                "model must not be empty".to_string(),
            ));
        }

        url::Url::parse(&self.base_url).map_err(|err| {
            BackendError::InvalidConfig(format!("base_url is invalid: {err}"))
        })?;

        Ok(())
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    safety_settings: Vec<SafetySetting>,
}

impl<'a> GenerateRequest<'a> {
    fn from_prompt(prompt: &'a str) -> Self {
        Self::new(vec![Content {
            role: "user",
            parts: vec![Part { text: prompt }],
        }])
    }

    fn from_input(input: &'a GenerationInput) -> Self {
        match input {
            GenerationInput::Prompt(prompt) => Self::from_prompt(prompt),
            GenerationInput::History(turns) => Self::new(turns.iter().map(content_for).collect()),
        }
    }

    fn new(contents: Vec<Content<'a>>) -> Self {
        Self {
            contents,
            safety_settings: SAFETY_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: SAFETY_THRESHOLD,
                })
                .collect(),
        }
    }
}

fn content_for(turn: &ContextTurn) -> Content<'_> {
    Content {
        role: turn.role.as_str(),
        parts: vec![Part {
            text: turn.text.as_str(),
        }],
    }
}

#[derive(Deserialize, Default)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

impl GenerateResponse {
    fn into_text(self) -> BackendResult<String> {
        if let Some(error) = self.error {
            return Err(BackendError::Api(error.message));
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return self
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
                .map_or_else(
                    || Ok(String::new()),
                    |reason| Err(BackendError::Api(format!("prompt blocked: {reason}"))),
                );
        };

        if let Some(reason) = candidate
            .finish_reason
            .filter(|reason| BLOCKING_FINISH_REASONS.contains(&reason.as_str()))
        {
            return Err(BackendError::Api(format!("response blocked: {reason}")));
        }

        Ok(candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

fn parse_chunk(payload: &str) -> BackendResult<String> {
    serde_json::from_str::<GenerateResponse>(payload)?.into_text()
}

/// Fragments read from a server-sent-events body.
///
/// Only `data:` lines are considered; the first failure ends the sequence.
struct SseFragments<R> {
    reader: R,
    line: String,
    done: bool,
}

impl<R: BufRead> SseFragments<R> {
    const fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for SseFragments<R> {
    type Item = BackendResult<Fragment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            }

            let line = self.line.trim_end_matches(['\r', '\n']);
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim_start();
            if payload.is_empty() {
                continue;
            }

            match parse_chunk(payload) {
                Ok(text) => return Some(Ok(Fragment::new(text))),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Blocking Gemini client.
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Build a client.
    ///
    /// A missing API key is not an error: the client is created and reports
    /// itself as not configured.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: GeminiConfig) -> BackendResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()?;

        if config.api_key.is_some() {
            info!(model = %config.model, "Gemini backend configured");
        } else {
            warn!("Gemini API key not configured");
        }

        Ok(Self { client, config })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/{API_VERSION}/models/{}:{method}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn api_key(&self) -> BackendResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::NotConfigured("Gemini API key is not set".to_string()))
    }

    fn post(&self, url: &str, request: &GenerateRequest<'_>) -> BackendResult<Response> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

impl GenerationBackend for GeminiClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn generate_once(&self, prompt: &str) -> BackendResult<Generation> {
        debug!(model = %self.config.model, chars = prompt.chars().count(), "Generating response");

        let request = GenerateRequest::from_prompt(prompt);
        let response = self.post(&self.endpoint("generateContent"), &request)?;
        let text = response.json::<GenerateResponse>()?.into_text()?;

        Ok(Generation {
            text,
            model: self.config.model.clone(),
        })
    }

    fn generate_streaming(&self, input: GenerationInput) -> BackendResult<FragmentStream> {
        debug!(model = %self.config.model, "Opening generation stream");

        let request = GenerateRequest::from_input(&input);
        let response = self.post(&self.endpoint("streamGenerateContent?alt=sse"), &request)?;

        Ok(Box::new(SseFragments::new(BufReader::new(response))))
    }
}
