use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use testrun_model::clients::KubeStore;
use testrun_model::constants::{DEFAULT_REPOSITORY_IMAGE, DEFAULT_REPOSITORY_STORAGE};
use testrun_model::repository::{Repository, RepositoryOptions};

/// Install the artifact repository into a namespace, unless it is there already. Test pods
/// started afterwards in the namespace are told how to reach it.
#[derive(Debug, Parser)]
pub(crate) struct InstallRepository {
    /// The namespace to install the repository into.
    #[clap(long, short = 'n', default_value = "default")]
    namespace: String,

    /// The object storage server image.
    #[clap(long, default_value = DEFAULT_REPOSITORY_IMAGE)]
    image: String,

    /// Size of the volume claimed for the stored objects.
    #[clap(long = "storage-size", default_value = DEFAULT_REPOSITORY_STORAGE)]
    storage_size: String,
}

impl InstallRepository {
    pub(crate) async fn run(self, client: kube::Client) -> Result<()> {
        let repository = Repository::new(
            Arc::new(KubeStore::new(client)),
            self.namespace.as_str(),
            RepositoryOptions {
                image: self.image,
                storage_size: self.storage_size,
            },
        );
        repository.ensure_installed().await.context(format!(
            "Unable to install the repository into '{}'",
            self.namespace
        ))?;
        println!(
            "The repository is installed in '{}' at '{}'.",
            self.namespace,
            repository
                .endpoint()
                .await
                .context("Unable to resolve the repository endpoint")?
        );
        Ok(())
    }
}
