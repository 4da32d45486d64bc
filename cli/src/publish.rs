use anyhow::{Context, Result};
use clap::{value_parser, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use testrun_model::clients::KubeStore;
use testrun_model::constants::DEFAULT_BUCKET;
use testrun_model::publish::{PublishDestination, Publisher, S3Connector, StorageConnector};
use testrun_model::repository::{Repository, RepositoryOptions};
use testrun_model::tunnel::KubePodDialer;
use tokio_util::sync::CancellationToken;

/// Publish a local directory to the artifact repository of a namespace, keeping its layout. The
/// repository must be installed.
#[derive(Debug, Parser)]
pub(crate) struct Publish {
    /// The directory to publish.
    #[clap(value_parser = value_parser!(PathBuf))]
    dir: PathBuf,

    /// The namespace of the repository.
    #[clap(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Where to publish, in `bucket[/prefix]` form.
    #[clap(long, default_value = DEFAULT_BUCKET)]
    bucket: String,

    /// Use the in-cluster address of the repository instead of a tunnel.
    #[clap(long)]
    direct: bool,
}

impl Publish {
    pub(crate) async fn run(self, client: kube::Client) -> Result<()> {
        let repository = Repository::new(
            Arc::new(KubeStore::new(client.clone())),
            self.namespace.as_str(),
            RepositoryOptions::default(),
        );
        let credentials = repository.credentials().await.context(format!(
            "Unable to read the credentials of the repository in '{}'",
            self.namespace
        ))?;

        // Closes the tunnel when we are done.
        let cancel = CancellationToken::new();
        let _tunnel_guard = cancel.clone().drop_guard();
        let endpoint = repository
            .open_connection(
                self.direct,
                Arc::new(KubePodDialer::new(client, &self.namespace)),
                cancel,
            )
            .await
            .context(format!(
                "Unable to reach the repository in '{}'",
                self.namespace
            ))?;

        let destination = PublishDestination {
            endpoint,
            access_key_id: credentials.access_key,
            access_key_secret: credentials.secret_key,
            use_ssl: false,
        };
        let uploaded = Publisher::new(S3Connector.connect(&destination))
            .publish(&self.dir, &self.bucket)
            .await
            .context(format!(
                "Unable to publish '{}' to '{}'",
                self.dir.display(),
                self.bucket
            ))?;
        println!("Published {} files to '{}'.", uploaded, self.bucket);
        Ok(())
    }
}
