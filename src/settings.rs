//! Process settings read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `CHAT_RELAY_PORT` | `8000` |
//! | `CHAT_RELAY_ALLOWED_ORIGINS` | the local development origins, comma separated |
//! | `GEMINI_API_KEY` | unset (backend reports itself unavailable) |
//! | `GEMINI_MODEL` | `gemini-2.0-flash-exp` |
//! | `GEMINI_BASE_URL` | `https://generativelanguage.googleapis.com` |
//! | `CHAT_RELAY_MAX_CONVERSATIONS` | `1000` |
//! | `CHAT_RELAY_MAX_AGE_HOURS` | `24` |
//! | `CHAT_RELAY_CLEANUP_INTERVAL_SECS` | `3600` |

use std::str::FromStr;

use thiserror::Error;

use crate::conversation::config::{StoreConfig, StoreConfigBuilder};
use crate::conversation::errors::StoreError;
use crate::llm::error::BackendError;
use crate::llm::gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, GeminiConfig};

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "http://localhost:3000",
    "http://localhost:8080",
    "http://localhost:5173",
];

/// Settings error type.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
    /// Store bounds rejected.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Backend settings rejected.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Convenience result alias for settings.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Everything the binary needs to start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Listening port.
    pub port: u16,
    /// Origins allowed by CORS. `*` allows any origin.
    pub allowed_origins: Vec<String>,
    /// Generation backend settings.
    pub gemini: GeminiConfig,
    /// Conversation store bounds.
    pub store: StoreConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(ToString::to_string)
                .collect(),
            gemini: GeminiConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or a bound is invalid.
    pub fn from_env() -> SettingsResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; unset or blank variables take defaults.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or a bound is invalid.
    pub fn from_lookup<F>(lookup: F) -> SettingsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let defaults = Self::default();

        let port = parse(&read, "CHAT_RELAY_PORT")?.unwrap_or(defaults.port);

        let allowed_origins = read("CHAT_RELAY_ALLOWED_ORIGINS").map_or(defaults.allowed_origins, |raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToString::to_string)
                .collect()
        });

        let gemini = GeminiConfig {
            api_key: read("GEMINI_API_KEY"),
            model: read("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: read("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        };
        gemini.validate()?;

        let mut store = StoreConfigBuilder::new();
        if let Some(max) = parse::<usize, _>(&read, "CHAT_RELAY_MAX_CONVERSATIONS")? {
            store = store.max_conversations(max);
        }
        if let Some(hours) = parse::<u64, _>(&read, "CHAT_RELAY_MAX_AGE_HOURS")? {
            store = store.max_age_hours(hours);
        }
        if let Some(seconds) = parse::<u64, _>(&read, "CHAT_RELAY_CLEANUP_INTERVAL_SECS")? {
            store = store.cleanup_interval_seconds(seconds);
        }
        let store = store.build();
        store.validate()?;

        Ok(Self {
            port,
            allowed_origins,
            gemini,
            store,
        })
    }
}

fn parse<T, R>(read: &R, name: &'static str) -> SettingsResult<Option<T>>
where
    T: FromStr,
    R: Fn(&str) -> Option<String>,
{
    read(name)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| SettingsError::InvalidValue { name, value })
        })
        .transpose()
}
