use super::context::ActionContext;
use super::{initialize, monitor, start};
use crate::error::{self, Result};
use snafu::ensure;
use testrun_model::{CrdExt, Phase, TestRun, TestRunStatus};

/// The steps that move a test run through its lifecycle. Each claims the phase it can handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    /// Assigns a test id to a new test run and moves it to `Pending`.
    Initialize,
    /// Submits the test pod and moves the run to `Running`.
    Start,
    /// Watches the test pod until it finishes.
    Monitor,
}

impl Action {
    pub(crate) const ALL: [Action; 3] = [Action::Initialize, Action::Start, Action::Monitor];

    pub(crate) fn can_handle(self, test_run: &TestRun) -> bool {
        match self {
            Action::Initialize => test_run.status.is_none(),
            Action::Start => test_run.phase() == Some(Phase::Pending),
            Action::Monitor => test_run.phase() == Some(Phase::Running),
        }
    }

    /// Returns the test run as it should be after the action. On error nothing about the test run
    /// has changed.
    pub(crate) async fn handle(self, test_run: &TestRun, ctx: &ActionContext) -> Result<TestRun> {
        match self {
            Action::Initialize => Ok(initialize::initialize(test_run)),
            Action::Start => start::start(test_run, ctx).await,
            Action::Monitor => monitor::monitor(test_run, ctx).await,
        }
    }
}

/// Determines the action for `test_run`, or `None` if there is nothing to do: the run has
/// finished or is being deleted.
pub(crate) fn select_action(test_run: &TestRun) -> Result<Option<Action>> {
    select_from(&Action::ALL, test_run)
}

fn select_from(actions: &[Action], test_run: &TestRun) -> Result<Option<Action>> {
    if test_run.is_delete_requested() || test_run.phase().map_or(false, Phase::is_terminal) {
        return Ok(None);
    }
    let matching: Vec<Action> = actions
        .iter()
        .copied()
        .filter(|action| action.can_handle(test_run))
        .collect();
    let phase = test_run
        .phase()
        .map_or_else(|| "(none)".to_string(), |phase| phase.to_string());
    ensure!(
        !matching.is_empty(),
        error::NoActionSnafu {
            test_name: test_run.object_name(),
            phase
        }
    );
    ensure!(
        matching.len() == 1,
        error::AmbiguousActionSnafu {
            test_name: test_run.object_name(),
            phase,
            actions: format!("{:?}", matching),
        }
    );
    Ok(matching.first().copied())
}

/// A copy of `test_run` moved to `phase`, keeping its test id.
pub(super) fn with_phase(test_run: &TestRun, phase: Phase) -> TestRun {
    let mut updated = test_run.clone();
    let test_id = test_run.test_id().to_owned();
    updated.status = Some(TestRunStatus { phase, test_id });
    updated
}
