use anyhow::{Context, Result};
use clap::{value_parser, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use testrun_model::clients::KubeStore;
use testrun_model::constants::DEFAULT_BUCKET;
use testrun_model::publish::{DeployOptions, Deployer, Maven, S3Connector};
use testrun_model::repository::{Repository, RepositoryOptions};
use testrun_model::tunnel::KubePodDialer;

/// Build a Maven project with its Maven wrapper and publish the result to the artifact repository
/// of a namespace. The repository is installed first if needed.
#[derive(Debug, Parser)]
pub(crate) struct Deploy {
    /// The project directory, which contains `pom.xml` and `mvnw`.
    #[clap(value_parser = value_parser!(PathBuf), default_value = ".")]
    project: PathBuf,

    /// The namespace of the repository.
    #[clap(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Where to publish, in `bucket[/prefix]` form.
    #[clap(long, default_value = DEFAULT_BUCKET)]
    bucket: String,

    /// How many seconds installing and reaching the repository may take.
    #[clap(long = "timeout-seconds", default_value = "600")]
    timeout_seconds: u64,

    /// Use the in-cluster address of the repository instead of a tunnel. Only works when running
    /// inside the cluster.
    #[clap(long)]
    direct: bool,
}

impl Deploy {
    pub(crate) async fn run(self, client: kube::Client) -> Result<()> {
        let repository = Repository::new(
            Arc::new(KubeStore::new(client.clone())),
            self.namespace.as_str(),
            RepositoryOptions::default(),
        );
        let deployer = Deployer::new(
            repository,
            Arc::new(Maven),
            Arc::new(KubePodDialer::new(client, &self.namespace)),
            Arc::new(S3Connector),
            DeployOptions {
                bucket: self.bucket,
                timeout: Duration::from_secs(self.timeout_seconds),
                direct: self.direct,
            },
        );
        let staging = TempDir::new().context("Unable to create a staging directory")?;
        let project_id = deployer
            .deploy(&self.project, staging.path())
            .await
            .context(format!(
                "Unable to deploy '{}' to '{}'",
                self.project.display(),
                self.namespace
            ))?;
        println!("Deployed '{}'.", project_id);
        Ok(())
    }
}
