use crate::manifest::{Manifest, ObjectType};
use async_trait::async_trait;
use kube::api::{ListParams, PostParams};
use kube::core::DynamicObject;
use kube::Api;
use log::trace;
use std::collections::BTreeMap;

/// The subset of the cluster API that the system needs. The purpose of the interface is to allow
/// injection of an in-memory store for development and testing without the presence of a k8s
/// cluster. In practice you will use [`KubeStore`].
///
/// Errors are returned as the `kube::Error` the API server produced so that callers can classify
/// them with [`HttpStatusCode`](crate::clients::HttpStatusCode).
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Create the object. Fails with `AlreadyExists` if an object with the same name exists.
    async fn create(&self, manifest: &Manifest) -> kube::Result<Manifest>;

    /// Get an object by name. `namespace` is ignored for cluster scoped kinds.
    async fn get(
        &self,
        object_type: &ObjectType,
        namespace: &str,
        name: &str,
    ) -> kube::Result<Manifest>;

    /// Replace the whole object. The manifest must carry the resource version it replaces.
    async fn replace(&self, manifest: &Manifest) -> kube::Result<Manifest>;

    /// List the objects of a kind whose labels contain all of `labels`.
    async fn list(
        &self,
        object_type: &ObjectType,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> kube::Result<Vec<Manifest>>;
}

/// Renders `labels` as a label selector, e.g. `a=b,c=d`.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(",")
}

/// The [`ClusterStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: kube::Client,
}

impl KubeStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, object_type: &ObjectType, namespace: &str) -> Api<DynamicObject> {
        if object_type.is_namespaced() {
            Api::namespaced_with(
                self.client.clone(),
                namespace,
                object_type.api_resource(),
            )
        } else {
            Api::all_with(self.client.clone(), object_type.api_resource())
        }
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn create(&self, manifest: &Manifest) -> kube::Result<Manifest> {
        trace!("creating {}", manifest);
        let created = self
            .api(manifest.object_type(), &manifest.namespace())
            .create(&PostParams::default(), manifest.object())
            .await?;
        Ok(manifest.with_object(created))
    }

    async fn get(
        &self,
        object_type: &ObjectType,
        namespace: &str,
        name: &str,
    ) -> kube::Result<Manifest> {
        let object = self.api(object_type, namespace).get(name).await?;
        Ok(Manifest::from_parts(object_type.clone(), object))
    }

    async fn replace(&self, manifest: &Manifest) -> kube::Result<Manifest> {
        trace!("replacing {}", manifest);
        let replaced = self
            .api(manifest.object_type(), &manifest.namespace())
            .replace(&manifest.name(), &PostParams::default(), manifest.object())
            .await?;
        Ok(manifest.with_object(replaced))
    }

    async fn list(
        &self,
        object_type: &ObjectType,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> kube::Result<Vec<Manifest>> {
        let objects = self
            .api(object_type, namespace)
            .list(&ListParams::default().labels(&label_selector(labels)))
            .await?;
        Ok(objects
            .items
            .into_iter()
            .map(|object| Manifest::from_parts(object_type.clone(), object))
            .collect())
    }
}
