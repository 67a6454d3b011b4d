//! Bounds and sweep cadence for the conversation store.

use std::time::Duration;

use crate::conversation::errors::{StoreError, StoreResult};

const SECONDS_PER_HOUR: u64 = 3600;

/// Configuration for the conversation store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum number of live conversations.
    pub max_conversations: usize,
    /// Idle time after which a conversation is eligible for eviction.
    pub max_age: Duration,
    /// Interval between background eviction passes.
    pub cleanup_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_conversations: 1000,
            max_age: Duration::from_secs(24 * SECONDS_PER_HOUR),
            cleanup_interval: Duration::from_secs(SECONDS_PER_HOUR),
        }
    }
}

impl StoreConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any bound is zero.
    pub fn validate(&self) -> StoreResult<()> {
        if self.max_conversations == 0 {
            return Err(StoreError::InvalidConfig(
                "max_conversations must be > 0".to_string(),
            ));
        }

        if self.max_age.is_zero() {
            return Err(StoreError::InvalidConfig(
                "max_age must be > 0".to_string(),
            ));
        }

        if self.cleanup_interval.is_zero() {
            return Err(StoreError::InvalidConfig(
                "cleanup_interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Maximum age expressed in hours.
    #[must_use]
    pub const fn max_age_hours(&self) -> f64 {
        self.max_age.as_secs_f64() / 3600.0
    }
}

/// Builder for store configuration.
#[derive(Debug, Clone, Default)]
pub struct StoreConfigBuilder {
    max_conversations: Option<usize>,
    max_age: Option<Duration>,
    cleanup_interval: Option<Duration>,
}

impl StoreConfigBuilder {
    /// Create a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of live conversations.
    #[must_use]
    pub const fn max_conversations(mut self, max: usize) -> Self {
        self.max_conversations = Some(max);
        self
    }

    /// Set the maximum idle age.
    #[must_use]
    pub const fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    /// Set the maximum idle age in hours.
    #[must_use]
    pub const fn max_age_hours(mut self, hours: u64) -> Self {
        self.max_age = Some(Duration::from_secs(hours.saturating_mul(SECONDS_PER_HOUR)));
        self
    }

    /// Set the interval between eviction passes.
    #[must_use]
    pub const fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Set the interval between eviction passes in seconds.
    #[must_use]
    pub const fn cleanup_interval_seconds(mut self, seconds: u64) -> Self {
        self.cleanup_interval = Some(Duration::from_secs(seconds));
        self
    }

    /// Build the store configuration.
    #[must_use]
    pub fn build(self) -> StoreConfig {
        let default = StoreConfig::default();
        StoreConfig {
            max_conversations: self.max_conversations.unwrap_or(default.max_conversations),
            max_age: self.max_age.unwrap_or(default.max_age),
            cleanup_interval: self.cleanup_interval.unwrap_or(default.cleanup_interval),
        }
    }
}
