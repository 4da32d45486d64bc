use crate::constants::{APP_TESTRUN, NAMESPACE};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use maplit::btreemap;

/// Defines the namespace the controller runs in.
pub fn testrun_namespace() -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            labels: Some(btreemap! {
                "name".to_string() => APP_TESTRUN.to_string()
            }),
            name: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: None,
        status: None,
    }
}
