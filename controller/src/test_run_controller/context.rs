use crate::config::ControllerConfig;
use std::sync::Arc;
use testrun_model::clients::{ClusterStore, KubeStore, TestRunClient};

/// This is used by `kube-runtime` to pass any custom information we need when [`reconcile`] is
/// called.
///
/// [`reconcile`]: super::reconcile::reconcile
pub(crate) type Context = Arc<ContextData>;

pub(crate) fn new_context(client: kube::Client, config: ControllerConfig) -> Context {
    Arc::new(ContextData {
        test_run_client: TestRunClient::new_from_k8s_client(client.clone()),
        actions: ActionContext {
            store: Arc::new(KubeStore::new(client)),
            config,
        },
    })
}

pub(crate) struct ContextData {
    test_run_client: TestRunClient,
    actions: ActionContext,
}

impl ContextData {
    pub(crate) fn test_run_client(&self) -> &TestRunClient {
        &self.test_run_client
    }

    pub(crate) fn actions(&self) -> &ActionContext {
        &self.actions
    }

    pub(crate) fn config(&self) -> &ControllerConfig {
        &self.actions.config
    }
}

/// What an action may use. Actions never write the test run itself, they return the updated
/// object and leave the status write to the reconciler.
pub(crate) struct ActionContext {
    pub(crate) store: Arc<dyn ClusterStore>,
    pub(crate) config: ControllerConfig,
}
