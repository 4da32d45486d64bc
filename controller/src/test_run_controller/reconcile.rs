use super::action::select_action;
use super::context::Context;
use crate::constants::{no_requeue, requeue};
use crate::error::{self, Error, Result};
use kube_runtime::controller::Action as RequeueAction;
use log::{debug, error, trace};
use snafu::ResultExt;
use std::sync::Arc;
use testrun_model::{CrdExt, Phase, TestRun};

/// `reconcile` is called when a `TestRun` or one of its pods changes, or when a `TestRun` has
/// been re-queued. This is the entrypoint to the controller logic.
pub(super) async fn reconcile(test_run: Arc<TestRun>, context: Context) -> Result<RequeueAction> {
    let test_name = test_run.object_name();
    trace!("Reconciling test run: {}", test_name);

    let action = match select_action(&test_run)? {
        Some(action) => action,
        None => {
            debug!("Nothing to do for test run '{}'", test_name);
            return Ok(no_requeue());
        }
    };
    trace!("Action: {:?}", action);
    let updated = action.handle(&test_run, context.actions()).await?;

    if updated.status != test_run.status {
        if let Some(status) = updated.status.clone() {
            let phase = status.phase;
            context
                .test_run_client()
                .set_status(&test_run, status)
                .await
                .context(error::SetStatusSnafu { test_name, phase })?;
        }
    }

    if updated.phase().map_or(false, Phase::is_terminal) {
        Ok(no_requeue())
    } else {
        Ok(requeue(context.config().requeue))
    }
}

/// `handle_reconciliation_error` is called when `reconcile` returns an error. A test run that no
/// action can handle is left alone until it changes.
pub(super) fn handle_reconciliation_error(
    test_run: Arc<TestRun>,
    e: &Error,
    context: Context,
) -> RequeueAction {
    error!(
        "Reconciliation error for test run '{}': {}",
        test_run.object_name(),
        e
    );
    match e {
        Error::NoAction { .. } | Error::AmbiguousAction { .. } => no_requeue(),
        _ => requeue(context.config().error_requeue),
    }
}
