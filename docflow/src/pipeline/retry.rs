//! Retry parameters and exponential back-off.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-wide retry parameters used by the Retry strategy.
///
/// The delay before retry `r` (0-based) is `time_unit * backoff_base^r`,
/// optionally capped at `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Back-off multiplier.
    pub backoff_base: f64,
    /// Length of one back-off time unit in milliseconds.
    pub time_unit_ms: u64,
    /// Upper bound for a single wait in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2.0,
            time_unit_ms: 1000,
            max_delay_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the back-off multiplier.
    #[must_use]
    pub fn with_backoff_base(mut self, base: f64) -> Self {
        self.backoff_base = base;
        self
    }

    /// Sets the time unit.
    #[must_use]
    pub fn with_time_unit_ms(mut self, millis: u64) -> Self {
        self.time_unit_ms = millis;
        self
    }

    /// Caps each wait.
    #[must_use]
    pub fn with_max_delay_ms(mut self, millis: u64) -> Self {
        self.max_delay_ms = Some(millis);
        self
    }

    /// Total invocations a failing stage may receive.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns true if another retry is allowed after `retries_done` retries.
    #[must_use]
    pub fn has_retries_left(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Wait before retry number `retries_done` (0-based).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn delay_for(&self, retries_done: u32) -> Duration {
        let exponent = i32::try_from(retries_done).unwrap_or(i32::MAX);
        let millis = self.time_unit_ms as f64 * self.backoff_base.powi(exponent);
        let delay = Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(Duration::MAX);

        match self.max_delay_ms {
            Some(cap) => delay.min(Duration::from_millis(cap)),
            None => delay,
        }
    }

    /// Checks the parameters.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.backoff_base.is_finite() || self.backoff_base <= 0.0 {
            return Err(ConfigurationError::InvalidBackoffBase(self.backoff_base));
        }
        Ok(())
    }
}
