use anyhow::{Context, Result};
use clap::Parser;
use testrun_model::clients::KubeStore;
use testrun_model::system::{install_controller, ControllerOptions};

/// The install subcommand is responsible for putting the controller and the `TestRun` CRD into a
/// k8s cluster. Running it again updates what is installed.
#[derive(Debug, Parser)]
pub(crate) struct Install {
    /// Controller image pull secret
    #[clap(long = "controller-image-secret", short = 's')]
    secret: Option<String>,

    /// Controller image uri
    #[clap(long = "controller-uri")]
    controller_uri: String,
}

impl Install {
    pub(crate) async fn run(self, client: kube::Client) -> Result<()> {
        let options = ControllerOptions {
            image: self.controller_uri,
            image_pull_secret: self.secret,
        };
        install_controller(&KubeStore::new(client), &options)
            .await
            .context(
                "Unable to install the controller to the cluster. (Some artifacts may be left behind)",
            )?;

        println!("The controller was successfully installed.");

        Ok(())
    }
}
