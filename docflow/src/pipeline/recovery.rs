//! Maps a failed stage outcome to the engine's next move.

use super::{ErrorStrategy, RetryPolicy};
use crate::core::StageOutcome;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the engine does after a stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Stop the run.
    Abort,
    /// Record the failure and move to the next stage.
    ContinueNext,
    /// Restore the snapshot taken before the stage, then stop.
    RestoreAndAbort,
    /// Wait, then invoke the same stage again.
    RetryNow(Duration),
    /// Record the failure and skip to the next stage.
    SkipNext,
}

impl RecoveryAction {
    /// Returns true if the run ends after this action.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Abort | Self::RestoreAndAbort)
    }

    /// Label stored in the `recovery` metadata of an outcome.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Abort => "aborted",
            Self::ContinueNext => "continued",
            Self::RestoreAndAbort => "rolled_back",
            Self::RetryNow(_) => "retrying",
            Self::SkipNext => "skipped",
        }
    }
}

/// The active strategy plus its retry parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecoveryPolicy {
    /// Strategy applied to every failure in a run.
    pub strategy: ErrorStrategy,
    /// Parameters used by the Retry strategy.
    pub retry: RetryPolicy,
}

impl ErrorRecoveryPolicy {
    /// Creates a new policy.
    #[must_use]
    pub fn new(strategy: ErrorStrategy, retry: RetryPolicy) -> Self {
        Self { strategy, retry }
    }

    /// Decides what to do after an attempt.
    ///
    /// `retries_done` counts the retries already performed for this stage.
    /// Successful outcomes always continue.
    #[must_use]
    pub fn decide(&self, outcome: &StageOutcome, retries_done: u32) -> RecoveryAction {
        if outcome.success {
            return RecoveryAction::ContinueNext;
        }

        match self.strategy {
            ErrorStrategy::FailFast => RecoveryAction::Abort,
            ErrorStrategy::Continue => RecoveryAction::ContinueNext,
            ErrorStrategy::Skip => RecoveryAction::SkipNext,
            ErrorStrategy::Rollback => RecoveryAction::RestoreAndAbort,
            ErrorStrategy::Retry => {
                if outcome.is_retryable() && self.retry.has_retries_left(retries_done) {
                    RecoveryAction::RetryNow(self.retry.delay_for(retries_done))
                } else {
                    RecoveryAction::Abort
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorInfo;

    fn failure() -> StageOutcome {
        StageOutcome::failed("b", ErrorInfo::stage_failed("boom"))
    }

    #[test]
    fn test_success_always_continues() {
        for strategy in ErrorStrategy::ALL {
            let policy = ErrorRecoveryPolicy::new(strategy, RetryPolicy::default());
            assert_eq!(
                policy.decide(&StageOutcome::succeeded("a"), 0),
                RecoveryAction::ContinueNext
            );
        }
    }

    #[test]
    fn test_strategy_mapping() {
        let decide = |strategy| {
            ErrorRecoveryPolicy::new(strategy, RetryPolicy::default()).decide(&failure(), 0)
        };

        assert_eq!(decide(ErrorStrategy::FailFast), RecoveryAction::Abort);
        assert_eq!(decide(ErrorStrategy::Continue), RecoveryAction::ContinueNext);
        assert_eq!(decide(ErrorStrategy::Skip), RecoveryAction::SkipNext);
        assert_eq!(decide(ErrorStrategy::Rollback), RecoveryAction::RestoreAndAbort);
        assert_eq!(
            decide(ErrorStrategy::Retry),
            RecoveryAction::RetryNow(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_retry_budget_runs_out() {
        let policy = ErrorRecoveryPolicy::new(ErrorStrategy::Retry, RetryPolicy::default());

        assert_eq!(policy.decide(&failure(), 2), RecoveryAction::RetryNow(Duration::from_secs(4)));
        assert_eq!(policy.decide(&failure(), 3), RecoveryAction::Abort);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let policy = ErrorRecoveryPolicy::new(ErrorStrategy::Retry, RetryPolicy::default());
        let outcome = StageOutcome::failed("b", ErrorInfo::stage_failed("bad input").permanent());

        assert_eq!(policy.decide(&outcome, 0), RecoveryAction::Abort);
    }

    #[test]
    fn test_action_labels() {
        assert!(RecoveryAction::Abort.is_terminal());
        assert!(RecoveryAction::RestoreAndAbort.is_terminal());
        assert!(!RecoveryAction::SkipNext.is_terminal());
        assert_eq!(RecoveryAction::ContinueNext.label(), "continued");
        assert_eq!(RecoveryAction::SkipNext.label(), "skipped");
    }
}
