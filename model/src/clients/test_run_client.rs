use crate::clients::error::{self, Result};
use crate::{CrdExt, TestRun, TestRunSpec, TestRunStatus};
use kube::api::{ObjectMeta, Patch, PatchParams, PostParams};
use kube::Api;
use log::trace;
use serde_json::json;
use snafu::{ensure, ResultExt};

/// An API client for `TestRun` objects, which live in the namespace of whoever created them.
///
/// # Example
///
/// ```
///# use testrun_model::clients::TestRunClient;
///# async fn no_run() {
/// let client = TestRunClient::new().await.unwrap();
/// let test_run = client.get("default", "my-test").await.unwrap();
///# }
/// ```
#[derive(Clone)]
pub struct TestRunClient {
    client: kube::Client,
}

impl TestRunClient {
    pub async fn new() -> Result<Self> {
        let k8s_client = kube::Client::try_default()
            .await
            .context(error::InitializationSnafu)?;
        Ok(Self::new_from_k8s_client(k8s_client))
    }

    pub fn new_from_k8s_client(client: kube::Client) -> Self {
        Self { client }
    }

    pub fn api(&self, namespace: &str) -> Api<TestRun> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Result<TestRun> {
        Ok(self
            .api(namespace)
            .get(name)
            .await
            .context(error::KubeApiCallForSnafu {
                operation: "get",
                name,
            })?)
    }

    pub async fn create(&self, test_run: &TestRun) -> Result<TestRun> {
        Ok(self
            .api(test_run.object_namespace())
            .create(&PostParams::default(), test_run)
            .await
            .context(error::KubeApiCallForSnafu {
                operation: "create",
                name: test_run.object_name(),
            })?)
    }

    /// Writes `status` to the status subresource. Moving an already initialized run backwards is
    /// refused before anything is sent.
    pub async fn set_status(&self, test_run: &TestRun, status: TestRunStatus) -> Result<TestRun> {
        if let Some(from) = test_run.phase() {
            ensure!(
                from == status.phase || from.can_transition_to(status.phase),
                error::PhaseTransitionSnafu {
                    name: test_run.object_name(),
                    from: from.as_str(),
                    to: status.phase.as_str(),
                }
            );
        }
        trace!(
            "setting status of test run '{}' to {}",
            test_run.object_name(),
            status.phase
        );
        let patch = json!({ "status": status });
        Ok(self
            .api(test_run.object_namespace())
            .patch_status(
                test_run.object_name(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await
            .context(error::KubeApiCallForSnafu {
                operation: "set status",
                name: test_run.object_name(),
            })?)
    }
}

/// Builds a `TestRun` object ready to be passed to [`TestRunClient::create`].
pub fn create_test_run_crd<S1, S2>(name: S1, namespace: S2, spec: TestRunSpec) -> TestRun
where
    S1: Into<String>,
    S2: Into<String>,
{
    TestRun {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            ..ObjectMeta::default()
        },
        spec,
        status: None,
    }
}

#[cfg(test)]
#[cfg(feature = "integ")]
mod test {
    use super::*;
    use crate::{Phase, SourceFile};
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::CustomResourceExt;
    use selftest::Cluster;

    const CLUSTER_NAME: &str = "test-run-client";
    const TEST_NAME: &str = "my-test";

    #[tokio::test]
    async fn status_moves_forward_only() {
        let cluster = Cluster::new(CLUSTER_NAME).unwrap();
        let k8s_client = cluster.k8s_client().await.unwrap();
        let crd_api: Api<CustomResourceDefinition> = Api::all(k8s_client.clone());
        crd_api
            .create(&PostParams::default(), &TestRun::crd())
            .await
            .unwrap();
        cluster
            .wait_for_object("testruns.testrun.dev", crd_api)
            .await
            .unwrap();

        let client = TestRunClient::new_from_k8s_client(k8s_client);
        let test_run = client
            .create(&create_test_run_crd(
                TEST_NAME,
                "default",
                TestRunSpec {
                    source: SourceFile {
                        name: "login.feature".into(),
                        content: "Feature: login".into(),
                    },
                    ..TestRunSpec::default()
                },
            ))
            .await
            .unwrap();

        let test_run = client
            .set_status(
                &test_run,
                TestRunStatus {
                    phase: Phase::Pending,
                    test_id: "abc".into(),
                },
            )
            .await
            .unwrap();
        let status = |phase| TestRunStatus {
            phase,
            test_id: "abc".into(),
        };
        let test_run = client
            .set_status(&test_run, status(Phase::Running))
            .await
            .unwrap();
        assert_eq!(test_run.phase(), Some(Phase::Running));
        assert_eq!(test_run.test_id(), "abc");

        assert!(client
            .set_status(&test_run, status(Phase::Pending))
            .await
            .is_err());
        client
            .set_status(&test_run, status(Phase::Error))
            .await
            .unwrap();
        assert_eq!(
            client.get("default", TEST_NAME).await.unwrap().phase(),
            Some(Phase::Error)
        );
    }
}
