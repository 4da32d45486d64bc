use super::verbs;
use crate::constants::{
    APP_COMPONENT, APP_MANAGED_BY, APP_PART_OF, APP_TESTRUN, CONTROLLER, LABEL_COMPONENT,
    NAMESPACE, TESTRUN,
};
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    Affinity, Container, LocalObjectReference, NodeAffinity, NodeSelector, NodeSelectorRequirement,
    NodeSelectorTerm, PodSpec, PodTemplateSpec, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use maplit::btreemap;

pub const CONTROLLER_SERVICE_ACCOUNT: &str = "testrun-controller-service-account";
const CONTROLLER_CLUSTER_ROLE: &str = "testrun-controller-role";
const CONTROLLER_CLUSTER_ROLE_BINDING: &str = "testrun-controller-role-binding";
pub const CONTROLLER_DEPLOYMENT: &str = "testrun-controller";

/// Defines the testrun-controller service account
pub fn controller_service_account() -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(CONTROLLER_SERVICE_ACCOUNT.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            annotations: Some(btreemap! {
                "kubernetes.io/service-account.name".to_string() => CONTROLLER_SERVICE_ACCOUNT.to_string()
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Defines the testrun-controller cluster role. Besides the test runs themselves, the controller
/// creates the test pods with their config maps, reads the repository of each namespace and sets
/// up the viewer role, which it can only grant what it holds itself.
pub fn controller_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(CONTROLLER_CLUSTER_ROLE.to_string()),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec![TESTRUN.to_string()]),
                resources: Some(vec!["testruns".to_string(), "testruns/status".to_string()]),
                verbs: verbs(&["get", "list", "patch", "update", "watch"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["".to_string()]),
                resources: Some(vec![
                    "configmaps".to_string(),
                    "pods".to_string(),
                    "serviceaccounts".to_string(),
                ]),
                verbs: verbs(&["create", "get", "list", "update", "watch"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["".to_string()]),
                resources: Some(vec![
                    "pods/log".to_string(),
                    "secrets".to_string(),
                    "services".to_string(),
                ]),
                verbs: verbs(&["get", "list", "watch"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["apps".to_string()]),
                resources: Some(vec!["deployments".to_string()]),
                verbs: verbs(&["get", "list"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["rbac.authorization.k8s.io".to_string()]),
                resources: Some(vec!["roles".to_string(), "rolebindings".to_string()]),
                verbs: verbs(&["create", "get"]),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

/// Defines the testrun-controller cluster role binding
pub fn controller_cluster_role_binding() -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(CONTROLLER_CLUSTER_ROLE_BINDING.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: CONTROLLER_CLUSTER_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: CONTROLLER_SERVICE_ACCOUNT.to_string(),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        }]),
    }
}

/// Defines the testrun-controller deployment
pub fn controller_deployment(
    controller_image: String,
    image_pull_secret: Option<String>,
) -> Deployment {
    let image_pull_secrets =
        image_pull_secret.map(|secret| vec![LocalObjectReference { name: Some(secret) }]);

    Deployment {
        metadata: ObjectMeta {
            labels: Some(
                btreemap! {
                    APP_COMPONENT => CONTROLLER,
                    APP_MANAGED_BY => APP_TESTRUN,
                    APP_PART_OF => APP_TESTRUN,
                    LABEL_COMPONENT => CONTROLLER,
                }
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ),
            name: Some(CONTROLLER_DEPLOYMENT.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(
                    btreemap! { LABEL_COMPONENT.to_string() => CONTROLLER.to_string()},
                ),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                rolling_update: Some(RollingUpdateDeployment {
                    max_unavailable: Some(IntOrString::String("100%".to_string())),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(btreemap! {
                        LABEL_COMPONENT.to_string() => CONTROLLER.to_string(),
                    }),
                    namespace: Some(NAMESPACE.to_string()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    affinity: Some(Affinity {
                        node_affinity: Some(NodeAffinity {
                            required_during_scheduling_ignored_during_execution: Some(
                                NodeSelector {
                                    node_selector_terms: vec![NodeSelectorTerm {
                                        match_expressions: Some(vec![NodeSelectorRequirement {
                                            key: "kubernetes.io/os".to_string(),
                                            operator: "In".to_string(),
                                            values: Some(vec!["linux".to_string()]),
                                        }]),
                                        ..Default::default()
                                    }],
                                },
                            ),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    containers: vec![Container {
                        image: Some(controller_image),
                        name: CONTROLLER.to_string(),
                        ..Default::default()
                    }],
                    image_pull_secrets,
                    service_account_name: Some(CONTROLLER_SERVICE_ACCOUNT.to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
