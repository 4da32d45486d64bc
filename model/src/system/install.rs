use super::{
    controller_cluster_role, controller_cluster_role_binding, controller_deployment,
    controller_service_account, testrun_namespace,
};
use crate::clients::ClusterStore;
use crate::manifest::Manifest;
use crate::upsert::{self, upsert_batch};
use crate::TestRun;
use kube::CustomResourceExt;
use log::info;
use snafu::{ResultExt, Snafu};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to convert the {} to a manifest: {}", what, source))]
    Manifest {
        what: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to install the controller: {}", source))]
    Apply { source: upsert::Error },
}

/// What the controller deployment runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerOptions {
    pub image: String,
    pub image_pull_secret: Option<String>,
}

/// The objects that make up an installation of the controller, in the order they are applied.
pub fn controller_manifests(options: &ControllerOptions) -> Result<Vec<Manifest>> {
    Ok(vec![
        Manifest::cluster(&testrun_namespace()).context(ManifestSnafu { what: "namespace" })?,
        Manifest::cluster(&TestRun::crd()).context(ManifestSnafu { what: "TestRun CRD" })?,
        Manifest::namespaced(&controller_service_account()).context(ManifestSnafu {
            what: "controller service account",
        })?,
        Manifest::cluster(&controller_cluster_role()).context(ManifestSnafu {
            what: "controller cluster role",
        })?,
        Manifest::cluster(&controller_cluster_role_binding()).context(ManifestSnafu {
            what: "controller cluster role binding",
        })?,
        Manifest::namespaced(&controller_deployment(
            options.image.clone(),
            options.image_pull_secret.clone(),
        ))
        .context(ManifestSnafu {
            what: "controller deployment",
        })?,
    ])
}

/// Installs or updates the controller and the `TestRun` CRD.
pub async fn install_controller(store: &dyn ClusterStore, options: &ControllerOptions) -> Result<()> {
    info!("Installing the controller with image '{}'", options.image);
    upsert_batch(store, &controller_manifests(options)?)
        .await
        .context(ApplySnafu)?;
    Ok(())
}
