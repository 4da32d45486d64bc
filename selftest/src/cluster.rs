use crate::test_settings::TestSettings;
use anyhow::{format_err, Result};
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client, Config,
};
use std::convert::TryInto;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

pub const KUBECONFIG_FILENAME: &str = "kubeconfig.yaml";

/// Represents a `kind` cluster. The `Drop` trait is implemented deleting the `kind` cluster when it
/// goes out of scope.
#[derive(Debug)]
pub struct Cluster {
    name: String,
    kubeconfig_dir: TempDir,
}

impl Cluster {
    /// Creates a `Cluster` while initializing a kind cluster. If a cluster named `cluster_name`
    ///  already exists, it will be deleted.
    pub fn new(cluster_name: &str) -> Result<Cluster> {
        let kubeconfig_dir = TempDir::new()?;
        Self::delete_kind_cluster(cluster_name)?;
        Self::create_kind_cluster(
            cluster_name,
            &kubeconfig_dir.path().join(KUBECONFIG_FILENAME),
        )?;
        Ok(Self {
            name: cluster_name.into(),
            kubeconfig_dir,
        })
    }

    /// Returns the path to the kubeconfig file in the `TempDir` created for the cluster.
    pub fn kubeconfig(&self) -> PathBuf {
        self.kubeconfig_dir.path().join(KUBECONFIG_FILENAME)
    }

    /// Create the k8s client for the cluster.
    pub async fn k8s_client(&self) -> Result<Client> {
        let kubeconfig = Kubeconfig::read_from(self.kubeconfig())?;
        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        Ok(config.try_into()?)
    }

    /// Polls until `get(name)` succeeds for an object of type `K`, or until the configured wait
    /// time elapses.
    pub async fn wait_for_object<K>(&self, name: &str, api: Api<K>) -> Result<()>
    where
        K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
    {
        let attempts = TestSettings::wait_seconds();
        for _ in 0..attempts {
            if api.get(name).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err(format_err!(
            "object '{}' did not appear within {}s",
            name,
            attempts
        ))
    }

    fn create_kind_cluster(name: &str, kubeconfig: &Path) -> Result<()> {
        let kubeconfig = kubeconfig
            .to_str()
            .ok_or_else(|| format_err!("non utf-8 path '{}'", kubeconfig.to_string_lossy()))?;
        run_kind(&[
            "--kubeconfig",
            kubeconfig,
            "create",
            "cluster",
            "--name",
            name,
        ])
    }

    fn delete_kind_cluster(name: &str) -> Result<()> {
        run_kind(&["delete", "cluster", "--name", name])
    }
}

fn run_kind(args: &[&str]) -> Result<()> {
    let output = Command::new(TestSettings::kind_path()).args(args).output()?;
    if !output.status.success() {
        return Err(format_err!(
            "'kind {}' failed with exit status '{}'\n\n{}\n\n{}",
            args.join(" "),
            output.status.code().unwrap_or(1),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        ));
    }
    Ok(())
}

impl Drop for Cluster {
    fn drop(&mut self) {
        if let Err(e) = Self::delete_kind_cluster(&self.name) {
            eprintln!("unable to delete kind cluster '{}': {}", self.name, e)
        }
    }
}
