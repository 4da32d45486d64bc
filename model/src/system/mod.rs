/// Encapsulates the K8S object definitions of the controller installation and of the identity
/// test pods run as.
mod controller;
mod install;
mod namespace;
mod viewer;

pub use controller::{
    controller_cluster_role, controller_cluster_role_binding, controller_deployment,
    controller_service_account, CONTROLLER_DEPLOYMENT, CONTROLLER_SERVICE_ACCOUNT,
};
pub use install::{controller_manifests, install_controller, ControllerOptions, Error, Result};
pub use namespace::testrun_namespace;
pub use viewer::{viewer_role, viewer_role_binding, viewer_service_account};

fn verbs(verbs: &[&str]) -> Vec<String> {
    verbs.iter().map(|s| s.to_string()).collect()
}
