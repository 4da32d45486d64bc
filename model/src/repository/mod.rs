/*!

The artifact repository: an object storage server installed on demand into a namespace, together
with the credentials needed to reach it.

The repository of a namespace is `NotInstalled` until [`Repository::ensure_installed`] succeeds.
Installation generates the credentials and applies the secret, storage claim, deployment and
service, in that order, through the upsert engine. The repository counts as installed only once
all four exist, so a failed installation is applied again by the next call. The secret is never
replaced: the first installer's keys are the ones the server and its clients use.

!*/

mod credentials;
mod error;
mod manifests;

pub use credentials::Credentials;
pub use error::{Error, Result};

use crate::clients::ClusterStore;
use crate::constants::{
    DEFAULT_REPOSITORY_IMAGE, DEFAULT_REPOSITORY_STORAGE, REPOSITORY_PORT,
};
use crate::manifest::{Manifest, ObjectType};
use crate::poll::{wait_for_ready, DEFAULT_POLL_INTERVAL};
use crate::tunnel::{open_tunnel, PodDialer};
use crate::upsert::{upsert_batch, upsert_with, OnExisting};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use log::info;
use manifests::{server_labels, SERVER_NAME};
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::{ensure, ResultExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How to run the repository server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryOptions {
    pub image: String,
    pub storage_size: String,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            image: DEFAULT_REPOSITORY_IMAGE.to_string(),
            storage_size: DEFAULT_REPOSITORY_STORAGE.to_string(),
        }
    }
}

/// The artifact repository of one namespace.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn ClusterStore>,
    namespace: String,
    options: RepositoryOptions,
}

impl Repository {
    pub fn new<S: Into<String>>(
        store: Arc<dyn ClusterStore>,
        namespace: S,
        options: RepositoryOptions,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            options,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `true` once the server deployment exists along with the secret, claim and service it
    /// depends on.
    pub async fn is_installed(&self) -> Result<bool> {
        Ok(self.has_server::<Deployment>().await?
            && self.has_server::<Service>().await?
            && self.has_server::<Secret>().await?
            && self.has_server::<PersistentVolumeClaim>().await?)
    }

    /// Installs the repository unless it is installed already. Concurrent installs converge: the
    /// first secret written wins and the remaining objects are replaced by the last writer.
    pub async fn ensure_installed(&self) -> Result<()> {
        if self.is_installed().await? {
            info!("The repository is already installed in '{}'", self.namespace);
            return Ok(());
        }
        info!("Installing the repository into '{}'", self.namespace);
        let credentials = Credentials::generate(SERVER_NAME);
        let namespace = self.namespace.as_str();
        let secret = to_manifest(&manifests::secret(namespace, &credentials))?;
        upsert_with(self.store.as_ref(), &secret, OnExisting::Keep)
            .await
            .context(error::InstallSnafu { namespace })?;
        let batch = vec![
            to_manifest(&manifests::claim(namespace, &self.options.storage_size))?,
            to_manifest(&manifests::deployment(namespace, &self.options.image))?,
            to_manifest(&manifests::service(namespace))?,
        ];
        upsert_batch(self.store.as_ref(), &batch)
            .await
            .context(error::InstallSnafu { namespace })?;
        info!("Installed the repository into '{}'", self.namespace);
        Ok(())
    }

    /// Reads the keys from the repository's secret, which must be the only one.
    pub async fn credentials(&self) -> Result<Credentials> {
        let secret: Secret = self.unique_server_object().await?;
        Credentials::from_secret(&secret)
    }

    /// The in-cluster address of the server, e.g. `testrun-repository:9000`.
    pub async fn direct_connection_host(&self) -> Result<String> {
        let service: Service = self.unique_server_object().await?;
        Ok(format!(
            "{}:{}",
            service.metadata.name.unwrap_or_default(),
            REPOSITORY_PORT
        ))
    }

    /// The URL pods in the namespace use to reach the server.
    pub async fn endpoint(&self) -> Result<String> {
        Ok(format!("http://{}", self.direct_connection_host().await?))
    }

    /// Returns a `host:port` from which the server can be reached. With `direct` this is the
    /// in-cluster address; otherwise a ready server pod is awaited and a tunnel to it is opened.
    /// The tunnel stays open until `cancel` fires.
    pub async fn open_connection(
        &self,
        direct: bool,
        dialer: Arc<dyn PodDialer>,
        cancel: CancellationToken,
    ) -> Result<String> {
        if direct {
            return self.direct_connection_host().await;
        }
        info!("Waiting for the repository pod to be ready");
        let pod = wait_for_ready(
            self.store.as_ref(),
            &self.namespace,
            &server_labels(),
            DEFAULT_POLL_INTERVAL,
            &cancel,
        )
        .await
        .context(error::PollSnafu)?;
        info!("Opening a connection to pod '{}'", pod);
        open_tunnel(dialer, &pod, &[REPOSITORY_PORT], cancel)
            .await
            .context(error::TunnelSnafu)
    }

    async fn has_server<K>(&self) -> Result<bool>
    where
        K: kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Ok(!self.list_server::<K>().await?.is_empty())
    }

    async fn list_server<K>(&self) -> Result<Vec<Manifest>>
    where
        K: kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        let object_type = ObjectType::namespaced::<K>();
        self.store
            .list(&object_type, &self.namespace, &server_labels())
            .await
            .context(error::ListSnafu {
                kind: object_type.kind(),
                namespace: &self.namespace,
            })
    }

    async fn unique_server_object<K>(&self) -> Result<K>
    where
        K: kube::Resource<DynamicType = (), Scope = NamespaceResourceScope> + DeserializeOwned,
    {
        let mut found = self.list_server::<K>().await?;
        ensure!(
            found.len() == 1,
            error::NotUniqueSnafu {
                kind: K::kind(&()),
                namespace: &self.namespace,
                count: found.len(),
            }
        );
        let manifest = found.remove(0);
        manifest.parse().context(error::ParseSnafu {
            kind: manifest.kind(),
            name: manifest.name(),
        })
    }
}

fn to_manifest<K>(object: &K) -> Result<Manifest>
where
    K: kube::Resource<DynamicType = (), Scope = NamespaceResourceScope> + Serialize,
{
    Manifest::namespaced(object).context(error::ManifestSnafu {
        kind: K::kind(&()),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clients::MemoryStore;
    use crate::tunnel::DialResult;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use maplit::btreemap;
    use std::collections::BTreeMap;

    const NAMESPACE: &str = "tests";

    fn repository() -> (Arc<MemoryStore>, Repository) {
        let store = Arc::new(MemoryStore::new());
        let repository = Repository::new(store.clone(), NAMESPACE, RepositoryOptions::default());
        (store, repository)
    }

    #[tokio::test]
    async fn install_applies_objects_in_order() {
        let (store, repository) = repository();
        assert!(!repository.is_installed().await.unwrap());
        repository.ensure_installed().await.unwrap();
        assert!(repository.is_installed().await.unwrap());
        assert_eq!(
            store.operations(),
            vec![
                "create Secret testrun-repository",
                "create PersistentVolumeClaim testrun-repository",
                "create Deployment testrun-repository",
                "create Service testrun-repository",
            ]
        );
    }

    #[tokio::test]
    async fn credentials_are_generated_once() {
        let (store, repository) = repository();
        repository.ensure_installed().await.unwrap();
        let first = repository.credentials().await.unwrap();
        for _ in 0..3 {
            repository.ensure_installed().await.unwrap();
        }
        assert_eq!(store.objects("Secret").len(), 1);
        assert_eq!(repository.credentials().await.unwrap(), first);
        assert_eq!(first.secret_name, SERVER_NAME);
        assert_eq!(first.access_key.len(), 64);
    }

    /// Yields after every list so that concurrent installers all see an empty namespace before
    /// any of them writes.
    struct YieldingStore {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl ClusterStore for YieldingStore {
        async fn create(&self, manifest: &Manifest) -> kube::Result<Manifest> {
            self.inner.create(manifest).await
        }

        async fn get(
            &self,
            object_type: &ObjectType,
            namespace: &str,
            name: &str,
        ) -> kube::Result<Manifest> {
            self.inner.get(object_type, namespace, name).await
        }

        async fn replace(&self, manifest: &Manifest) -> kube::Result<Manifest> {
            self.inner.replace(manifest).await
        }

        async fn list(
            &self,
            object_type: &ObjectType,
            namespace: &str,
            labels: &BTreeMap<String, String>,
        ) -> kube::Result<Vec<Manifest>> {
            let listed = self.inner.list(object_type, namespace, labels).await;
            tokio::task::yield_now().await;
            listed
        }
    }

    #[tokio::test]
    async fn concurrent_installs_converge() {
        let store = Arc::new(MemoryStore::new());
        let yielding = Arc::new(YieldingStore {
            inner: store.clone(),
        });
        let first = Repository::new(yielding.clone(), NAMESPACE, RepositoryOptions::default());
        let second = Repository::new(yielding, NAMESPACE, RepositoryOptions::default());
        let (a, b) = tokio::join!(first.ensure_installed(), second.ensure_installed());
        a.unwrap();
        b.unwrap();

        let operations = store.operations();
        assert_eq!(
            operations
                .iter()
                .filter(|op| op.as_str() == "create Secret testrun-repository")
                .count(),
            1
        );
        assert!(
            !operations.iter().any(|op| op.starts_with("replace Secret")),
            "{:?}",
            operations
        );
        assert!(
            operations.contains(&"replace Deployment testrun-repository".to_string()),
            "{:?}",
            operations
        );
        assert!(
            operations.contains(&"replace Service testrun-repository".to_string()),
            "{:?}",
            operations
        );
        assert_eq!(store.objects("Secret").len(), 1);
        assert_eq!(store.objects("Service").len(), 1);

        let credentials = first.credentials().await.unwrap();
        assert_eq!(second.credentials().await.unwrap(), credentials);
        assert!(first.is_installed().await.unwrap());
    }

    #[tokio::test]
    async fn partial_install_is_completed_on_retry() {
        let (store, repository) = repository();
        store.fail_creates_of("Service");
        let error = repository.ensure_installed().await.unwrap_err();
        assert!(error.to_string().contains("Service"), "{}", error);
        assert_eq!(store.objects("Deployment").len(), 1);
        assert!(!repository.is_installed().await.unwrap());
        let keys = repository.credentials().await.unwrap();

        store.clear_failures();
        repository.ensure_installed().await.unwrap();
        assert!(repository.is_installed().await.unwrap());
        assert_eq!(store.objects("Service").len(), 1);
        assert_eq!(
            repository.endpoint().await.unwrap(),
            "http://testrun-repository:9000"
        );
        // The retry generated new keys but the stored ones stay.
        assert_eq!(repository.credentials().await.unwrap(), keys);
    }

    #[tokio::test]
    async fn failed_install_is_retried_from_scratch() {
        let (store, repository) = repository();
        store.fail_creates_of("Deployment");
        let error = repository.ensure_installed().await.unwrap_err();
        assert!(error.to_string().contains("Deployment"), "{}", error);
        assert!(!repository.is_installed().await.unwrap());
        assert!(store.objects("Service").is_empty());

        store.clear_failures();
        repository.ensure_installed().await.unwrap();
        assert!(repository.is_installed().await.unwrap());
        assert_eq!(store.objects("Secret").len(), 1);
        repository.credentials().await.unwrap();
    }

    #[tokio::test]
    async fn credentials_require_exactly_one_secret() {
        let (store, repository) = repository();
        assert!(matches!(
            repository.credentials().await,
            Err(Error::NotUnique { count: 0, .. })
        ));

        repository.ensure_installed().await.unwrap();
        let mut other = manifests::secret(NAMESPACE, &Credentials::generate("other"));
        other.metadata.name = Some("other".into());
        store.insert(Manifest::namespaced(&other).unwrap());
        assert!(matches!(
            repository.credentials().await,
            Err(Error::NotUnique { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected() {
        let (store, repository) = repository();
        let mut secret = manifests::secret(NAMESPACE, &Credentials::generate(SERVER_NAME));
        secret.data = Some(btreemap! {
            "access-key".to_string() => ByteString(Vec::new()),
            "secret-key".to_string() => ByteString(b"abc".to_vec()),
        });
        store.insert(Manifest::namespaced(&secret).unwrap());
        assert!(matches!(
            repository.credentials().await,
            Err(Error::EmptyKey { .. })
        ));
    }

    #[tokio::test]
    async fn endpoint_uses_the_service() {
        let (_, repository) = repository();
        assert!(repository.direct_connection_host().await.is_err());
        repository.ensure_installed().await.unwrap();
        assert_eq!(
            repository.direct_connection_host().await.unwrap(),
            "testrun-repository:9000"
        );
        assert_eq!(
            repository.endpoint().await.unwrap(),
            "http://testrun-repository:9000"
        );
    }

    struct ClosedDialer;

    #[async_trait]
    impl PodDialer for ClosedDialer {
        async fn dial(&self, _pod: &str, _port: u16) -> DialResult {
            let (local, _) = tokio::io::duplex(64);
            Ok(Box::new(local))
        }
    }

    #[tokio::test]
    async fn connection_through_a_tunnel() {
        let (store, repository) = repository();
        repository.ensure_installed().await.unwrap();
        let cancel = CancellationToken::new();

        let direct = repository
            .open_connection(true, Arc::new(ClosedDialer), cancel.clone())
            .await
            .unwrap();
        assert_eq!(direct, "testrun-repository:9000");

        store.insert(
            Manifest::namespaced(&Pod {
                metadata: ObjectMeta {
                    name: Some("testrun-repository-abc".into()),
                    namespace: Some(NAMESPACE.into()),
                    labels: Some(server_labels()),
                    ..ObjectMeta::default()
                },
                status: Some(PodStatus {
                    conditions: Some(vec![PodCondition {
                        type_: "ContainersReady".into(),
                        status: "True".into(),
                        ..PodCondition::default()
                    }]),
                    ..PodStatus::default()
                }),
                ..Pod::default()
            })
            .unwrap(),
        );
        let tunneled = repository
            .open_connection(false, Arc::new(ClosedDialer), cancel.clone())
            .await
            .unwrap();
        assert!(tunneled.starts_with("localhost:"), "{}", tunneled);
        cancel.cancel();
    }

    #[tokio::test]
    async fn cancelled_while_waiting_for_the_pod() {
        let (_, repository) = repository();
        repository.ensure_installed().await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = repository
            .open_connection(false, Arc::new(ClosedDialer), cancel)
            .await
            .unwrap_err();
        assert!(error.is_cancelled(), "{}", error);
    }
}
