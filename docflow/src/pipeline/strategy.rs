//! Pipeline-wide error strategies.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the engine reacts when a stage fails.
///
/// Exactly one strategy governs a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Stop on the first failure (default).
    #[default]
    FailFast,
    /// Record the failure and run the next stage.
    Continue,
    /// Restore the snapshot taken before the failing stage, then stop.
    Rollback,
    /// Re-run the failing stage with exponential back-off.
    Retry,
    /// Record the failure and skip to the next stage.
    Skip,
}

impl ErrorStrategy {
    /// Every strategy, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::FailFast,
        Self::Continue,
        Self::Rollback,
        Self::Retry,
        Self::Skip,
    ];

    /// The configuration name of the strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailFast => "fail_fast",
            Self::Continue => "continue",
            Self::Rollback => "rollback",
            Self::Retry => "retry",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ErrorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorStrategy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| ConfigurationError::UnknownStrategy {
                name: s.to_string(),
                valid: Self::ALL.iter().map(|st| st.as_str().to_string()).collect(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fail_fast() {
        assert_eq!(ErrorStrategy::default(), ErrorStrategy::FailFast);
    }

    #[test]
    fn test_from_str_accepts_variants() {
        assert_eq!("retry".parse::<ErrorStrategy>().unwrap(), ErrorStrategy::Retry);
        assert_eq!("Fail-Fast".parse::<ErrorStrategy>().unwrap(), ErrorStrategy::FailFast);
        assert_eq!(" skip ".parse::<ErrorStrategy>().unwrap(), ErrorStrategy::Skip);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "explode".parse::<ErrorStrategy>().unwrap_err();
        match err {
            ConfigurationError::UnknownStrategy { name, valid } => {
                assert_eq!(name, "explode");
                assert_eq!(valid.len(), 5);
                assert!(valid.contains(&"rollback".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_serde_round_trip_names() {
        for strategy in ErrorStrategy::ALL {
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{}\"", strategy.as_str()));
        }
    }
}
