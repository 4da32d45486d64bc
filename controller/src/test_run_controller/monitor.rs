use super::action::with_phase;
use super::context::ActionContext;
use crate::error::{self, Result};
use k8s_openapi::api::core::v1::Pod;
use log::{info, trace, warn};
use snafu::ResultExt;
use testrun_model::clients::HttpStatusCode;
use testrun_model::{CrdExt, ObjectType, Phase, TestRun};

/// Moves a running test run to `Passed` or `Failed` once its pod has finished. A test run whose
/// pod has disappeared cannot finish and is moved to `Error`.
pub(super) async fn monitor(test_run: &TestRun, ctx: &ActionContext) -> Result<TestRun> {
    let test_name = test_run.object_name();
    let pod = match ctx
        .store
        .get(
            &ObjectType::namespaced::<Pod>(),
            test_run.object_namespace(),
            &test_run.resource_name(),
        )
        .await
    {
        Ok(pod) => pod
            .parse::<Pod>()
            .context(error::ManifestSnafu {
                test_name,
                what: "pod",
            })?,
        Err(e) if e.is_not_found() => {
            warn!("The test pod of '{}' is gone", test_name);
            return Ok(with_phase(test_run, Phase::Error));
        }
        Err(e) => return Err(e).context(error::GetPodSnafu { test_name }),
    };

    let pod_phase = pod.status.and_then(|status| status.phase);
    let phase = match pod_phase.as_deref() {
        Some("Succeeded") => Phase::Passed,
        Some("Failed") => Phase::Failed,
        _ => {
            trace!("Test run '{}' pod phase {:?}", test_name, pod_phase);
            return Ok(test_run.clone());
        }
    };
    info!("Test run '{}' finished: {}", test_name, phase);
    Ok(with_phase(test_run, phase))
}
