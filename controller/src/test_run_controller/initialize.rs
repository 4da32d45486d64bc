use log::debug;
use testrun_model::{CrdExt, Phase, TestRun, TestRunStatus};
use uuid::Uuid;

/// Acknowledges a new test run by giving it an id and the `Pending` phase.
pub(super) fn initialize(test_run: &TestRun) -> TestRun {
    let test_id = Uuid::new_v4().to_string();
    debug!(
        "Initializing test run '{}' with id '{}'",
        test_run.object_name(),
        test_id
    );
    let mut updated = test_run.clone();
    updated.status = Some(TestRunStatus {
        phase: Phase::Pending,
        test_id,
    });
    updated
}

#[test]
fn fresh_ids() {
    let test_run = TestRun::new("login", Default::default());
    let first = initialize(&test_run);
    let second = initialize(&test_run);
    assert_eq!(first.phase(), Some(Phase::Pending));
    assert_eq!(first.test_id().len(), 36);
    assert_ne!(first.test_id(), second.test_id());
}
