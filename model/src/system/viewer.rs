use super::verbs;
use crate::constants::VIEWER;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use kube::api::ObjectMeta;

fn viewer_meta(namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(VIEWER.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// The identity test pods of `namespace` run as.
pub fn viewer_service_account(namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: viewer_meta(namespace),
        ..Default::default()
    }
}

/// Read-only access to the core objects of `namespace`.
pub fn viewer_role(namespace: &str) -> Role {
    Role {
        metadata: viewer_meta(namespace),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec![
                "configmaps".to_string(),
                "pods".to_string(),
                "pods/log".to_string(),
                "services".to_string(),
            ]),
            verbs: verbs(&["get", "list", "watch"]),
            ..Default::default()
        }]),
    }
}

pub fn viewer_role_binding(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: viewer_meta(namespace),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: VIEWER.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: VIEWER.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}
