use crate::config::ControllerConfig;
use context::new_context;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube_runtime::{controller, watcher, Controller};
use log::{debug, error};
use reconcile::{handle_reconciliation_error, reconcile};
use testrun_model::constants::{APP_TESTRUN, LABEL_APP};
use testrun_model::TestRun;

mod action;
mod context;
mod initialize;
mod monitor;
mod reconcile;
mod start;
mod test_pod;

/// Runs the controller for `TestRun` objects of all namespaces. Changes to test pods trigger a
/// reconciliation of the test run that owns them.
pub(super) async fn run_test_run_controller(client: kube::Client, config: ControllerConfig) {
    let context = new_context(client.clone(), config);
    let pods = Api::<Pod>::all(client.clone());
    Controller::new(Api::<TestRun>::all(client), watcher::Config::default())
        .owns(
            pods,
            watcher::Config::default().labels(&format!("{}={}", LABEL_APP, APP_TESTRUN)),
        )
        .run(reconcile, handle_reconciliation_error, context)
        .for_each(|reconciliation_result| async move {
            if let Err(reconciliation_err) = reconciliation_result {
                match &reconciliation_err {
                    controller::Error::ObjectNotFound { .. } => {
                        debug!("Object is gone: {}", reconciliation_err)
                    }
                    _ => error!("Error during reconciliation: {}", reconciliation_err),
                }
            }
        })
        .await;
}
