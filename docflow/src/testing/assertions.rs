//! Test assertions for pipeline outcomes.

use crate::core::PipelineOutcome;

/// Asserts that the run succeeded.
pub fn assert_pipeline_succeeded<D>(outcome: &PipelineOutcome<D>) {
    assert!(
        outcome.success,
        "Expected pipeline '{}' to succeed, got error: {:?} (aborted at {:?})",
        outcome.pipeline_name, outcome.error, outcome.aborted_at
    );
}

/// Asserts that the run failed.
pub fn assert_pipeline_failed<D>(outcome: &PipelineOutcome<D>) {
    assert!(
        !outcome.success,
        "Expected pipeline '{}' to fail, but it succeeded",
        outcome.pipeline_name
    );
}

/// Asserts that the run stopped at the given stage.
pub fn assert_aborted_at<D>(outcome: &PipelineOutcome<D>, stage: &str) {
    assert_eq!(
        outcome.aborted_at.as_deref(),
        Some(stage),
        "Expected run to abort at '{stage}', got {:?}",
        outcome.aborted_at
    );
}

/// Asserts the exact sequence of stages that produced an outcome.
pub fn assert_stage_order<D>(outcome: &PipelineOutcome<D>, expected: &[&str]) {
    assert_eq!(
        outcome.stage_names(),
        expected,
        "Unexpected stage order"
    );
}

/// Asserts that a stage produced a failed outcome.
pub fn assert_stage_failed<D>(outcome: &PipelineOutcome<D>, stage: &str) {
    match outcome.outcome(stage) {
        Some(o) => assert!(!o.success, "Expected stage '{stage}' to fail, but it succeeded"),
        None => panic!("Stage '{stage}' has no outcome. Stages: {:?}", outcome.stage_names()),
    }
}

/// Asserts how many times a stage was invoked.
pub fn assert_stage_attempts<D>(outcome: &PipelineOutcome<D>, stage: &str, expected: u32) {
    let actual = outcome.outcome(stage).map(|o| o.attempt_count);
    assert_eq!(
        actual,
        Some(expected),
        "Expected {expected} attempts for stage '{stage}', got {actual:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutcome;
    use crate::errors::ErrorInfo;
    use uuid::Uuid;

    fn aborted() -> PipelineOutcome<()> {
        PipelineOutcome {
            pipeline_name: "p".to_string(),
            execution_id: Uuid::new_v4(),
            success: false,
            outcomes: vec![
                StageOutcome::succeeded("a"),
                StageOutcome::failed("b", ErrorInfo::stage_failed("boom")),
            ],
            final_document: (),
            aborted_at: Some("b".to_string()),
            error: Some("boom".to_string()),
            rolled_back: false,
            duration_ms: 0.0,
        }
    }

    #[test]
    fn test_assertions_accept_matching_outcome() {
        let outcome = aborted();
        assert_pipeline_failed(&outcome);
        assert_aborted_at(&outcome, "b");
        assert_stage_order(&outcome, &["a", "b"]);
        assert_stage_failed(&outcome, "b");
        assert_stage_attempts(&outcome, "a", 1);
    }

    #[test]
    #[should_panic(expected = "to succeed")]
    fn test_assert_succeeded_panics_on_failure() {
        assert_pipeline_succeeded(&aborted());
    }

    #[test]
    #[should_panic(expected = "has no outcome")]
    fn test_assert_stage_failed_panics_on_missing_stage() {
        assert_stage_failed(&aborted(), "c");
    }
}
