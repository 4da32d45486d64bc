/*!

Idempotent create-or-replace of cluster objects.

An upsert first tries to create the object. When the object already exists it is replaced as a
whole by the desired object, carrying forward only the resource version and the fields that the
API server assigns and refuses to change (see [`PRESERVED_FIELDS`]). Kinds listed in
[`IMMUTABLE_KINDS`] are left alone when they already exist, as is any object upserted with
[`OnExisting::Keep`].

!*/

use crate::clients::{ClusterStore, HttpStatusCode, StatusCode};
use crate::manifest::Manifest;
use log::debug;
use serde_json::{Map, Value};
use snafu::{ResultExt, Snafu};

/// Kinds whose existing object wins over the desired one.
pub const IMMUTABLE_KINDS: &[&str] = &["PersistentVolumeClaim"];

/// JSON pointers into the existing object that are copied into the desired object before a
/// replace, per kind.
pub const PRESERVED_FIELDS: &[(&str, &[&str])] =
    &[("Service", &["/spec/clusterIP", "/spec/clusterIPs"])];

pub type Result<T> = std::result::Result<T, Error>;

/// What an upsert does when the object already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExisting {
    /// Replace it with the desired object.
    Replace,
    /// Leave it as it is and return it.
    Keep,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to create {} '{}': {}", kind, name, source))]
    Create {
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to get existing {} '{}': {}", kind, name, source))]
    GetExisting {
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to replace {} '{}': {}", kind, name, source))]
    Replace {
        kind: String,
        name: String,
        source: kube::Error,
    },
}

impl Error {
    fn source_error(&self) -> &kube::Error {
        match self {
            Error::Create { source, .. }
            | Error::GetExisting { source, .. }
            | Error::Replace { source, .. } => source,
        }
    }
}

impl HttpStatusCode for Error {
    fn status_code(&self) -> Option<StatusCode> {
        self.source_error().status_code()
    }

    fn status_reason(&self) -> Option<&str> {
        self.source_error().status_reason()
    }
}

/// Creates `desired`, or replaces the existing object of the same kind and name with it. Returns
/// the object as stored.
///
/// A stale resource version (i.e. somebody else wrote the object between our read and our
/// replace) is returned as a `Conflict` error and is not retried here.
pub async fn upsert(store: &dyn ClusterStore, desired: &Manifest) -> Result<Manifest> {
    let on_existing = if IMMUTABLE_KINDS.contains(&desired.kind()) {
        OnExisting::Keep
    } else {
        OnExisting::Replace
    };
    upsert_with(store, desired, on_existing).await
}

/// Like [`upsert`], but the caller decides what happens to an existing object regardless of its
/// kind.
pub async fn upsert_with(
    store: &dyn ClusterStore,
    desired: &Manifest,
    on_existing: OnExisting,
) -> Result<Manifest> {
    let kind = desired.kind().to_string();
    let name = desired.name();
    let create_error = match store.create(desired).await {
        Ok(created) => {
            debug!("created {}", created);
            return Ok(created);
        }
        Err(e) => e,
    };
    if !create_error.is_already_exists() {
        return Err(create_error).context(CreateSnafu { kind, name });
    }

    let existing = store
        .get(desired.object_type(), &desired.namespace(), &name)
        .await
        .context(GetExistingSnafu {
            kind: &kind,
            name: &name,
        })?;
    if on_existing == OnExisting::Keep {
        debug!("{} already exists and is not replaced", existing);
        return Ok(existing);
    }

    let mut replacement = desired.clone();
    carry_forward(&existing, &mut replacement);
    let replaced = store
        .replace(&replacement)
        .await
        .context(ReplaceSnafu { kind, name })?;
    debug!(
        "replaced {} at resource version {}",
        replaced,
        replaced.resource_version().unwrap_or_default()
    );
    Ok(replaced)
}

/// Upserts `items` strictly in order. The first failure stops the batch; objects applied before
/// it are left in place.
pub async fn upsert_batch(store: &dyn ClusterStore, items: &[Manifest]) -> Result<Vec<Manifest>> {
    let mut applied = Vec::with_capacity(items.len());
    for item in items {
        applied.push(upsert(store, item).await?);
    }
    Ok(applied)
}

fn carry_forward(existing: &Manifest, desired: &mut Manifest) {
    desired.set_resource_version(existing.resource_version());
    let pointers = PRESERVED_FIELDS
        .iter()
        .filter(|(kind, _)| *kind == existing.kind())
        .flat_map(|(_, pointers)| pointers.iter());
    for pointer in pointers {
        if let Some(value) = existing.data().pointer(pointer) {
            set_pointer(desired.data_mut(), pointer, value.clone());
        }
    }
}

/// Sets the value at a JSON pointer, creating intermediate objects as needed. Does nothing if a
/// non-object value is in the way.
fn set_pointer(target: &mut Value, pointer: &str, value: Value) {
    let mut tokens: Vec<&str> = pointer.split('/').skip(1).collect();
    let last = match tokens.pop() {
        Some(last) => last,
        None => return,
    };
    let mut current = target;
    for token in tokens {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(token.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), value);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clients::MemoryStore;
    use crate::manifest::ObjectType;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{
        ConfigMap, PersistentVolumeClaim, PersistentVolumeClaimSpec, Pod, ResourceRequirements,
        Service, ServicePort, ServiceSpec,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use kube::api::ObjectMeta;
    use maplit::btreemap;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some("default".into()),
            ..ObjectMeta::default()
        }
    }

    fn config_map(name: &str, content: &str) -> Manifest {
        Manifest::namespaced(&ConfigMap {
            metadata: meta(name),
            data: Some(btreemap! { "test.feature".to_string() => content.to_string() }),
            ..ConfigMap::default()
        })
        .unwrap()
    }

    fn service(port: i32) -> Manifest {
        Manifest::namespaced(&Service {
            metadata: meta("repository"),
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port,
                    ..ServicePort::default()
                }]),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        })
        .unwrap()
    }

    fn claim(size: &str) -> Manifest {
        Manifest::namespaced(&PersistentVolumeClaim {
            metadata: meta("repository"),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".into()]),
                resources: Some(ResourceRequirements {
                    requests: Some(btreemap! { "storage".to_string() => Quantity(size.into()) }),
                    ..ResourceRequirements::default()
                }),
                ..PersistentVolumeClaimSpec::default()
            }),
            ..PersistentVolumeClaim::default()
        })
        .unwrap()
    }

    fn version(manifest: &Manifest) -> u64 {
        manifest.resource_version().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn upsert_converges_to_latest_desired_state() {
        let store = MemoryStore::new();
        let first = upsert(&store, &config_map("test-a", "one")).await.unwrap();
        let second = upsert(&store, &config_map("test-a", "two")).await.unwrap();
        assert!(version(&second) > version(&first));

        let stored = store.object("ConfigMap", "default", "test-a").unwrap();
        assert_eq!(stored.data()["data"]["test.feature"], "two");
        assert_eq!(
            store.operations(),
            vec!["create ConfigMap test-a", "replace ConfigMap test-a"]
        );
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = MemoryStore::new();
        upsert(&store, &config_map("test-a", "one")).await.unwrap();
        upsert(&store, &config_map("test-a", "one")).await.unwrap();
        upsert(&store, &config_map("test-a", "one")).await.unwrap();
        assert_eq!(store.objects("ConfigMap").len(), 1);
    }

    #[tokio::test]
    async fn service_keeps_its_cluster_ip() {
        let store = MemoryStore::new();
        let created = upsert(&store, &service(80)).await.unwrap();
        let ip = created.data()["spec"]["clusterIP"].clone();
        assert!(ip.is_string());

        let replaced = upsert(&store, &service(8080)).await.unwrap();
        assert_eq!(replaced.data()["spec"]["clusterIP"], ip);
        assert_eq!(replaced.data()["spec"]["ports"][0]["port"], 8080);
    }

    #[tokio::test]
    async fn existing_claim_is_left_alone() {
        let store = MemoryStore::new();
        let created = upsert(&store, &claim("8Gi")).await.unwrap();
        let existing = upsert(&store, &claim("16Gi")).await.unwrap();
        assert_eq!(version(&existing), version(&created));
        assert_eq!(
            existing.data()["spec"]["resources"]["requests"]["storage"],
            "8Gi"
        );
        assert_eq!(
            store.operations(),
            vec!["create PersistentVolumeClaim repository"]
        );
    }

    #[tokio::test]
    async fn keep_leaves_any_existing_kind_alone() {
        let store = MemoryStore::new();
        upsert(&store, &config_map("test-a", "one")).await.unwrap();
        let kept = upsert_with(&store, &config_map("test-a", "two"), OnExisting::Keep)
            .await
            .unwrap();
        assert_eq!(kept.data()["data"]["test.feature"], "one");
        assert_eq!(store.operations(), vec!["create ConfigMap test-a"]);

        let created = upsert_with(&store, &config_map("test-b", "two"), OnExisting::Keep)
            .await
            .unwrap();
        assert_eq!(created.data()["data"]["test.feature"], "two");
    }

    #[tokio::test]
    async fn batch_stops_at_first_failure() {
        let store = MemoryStore::new();
        store.fail_creates_of("Pod");
        let pod = Manifest::namespaced(&Pod {
            metadata: meta("test-a"),
            ..Pod::default()
        })
        .unwrap();
        let error = upsert_batch(&store, &[config_map("test-a", "one"), pod, service(80)])
            .await
            .unwrap_err();

        assert!(error.to_string().contains("Pod 'test-a'"), "{}", error);
        assert_eq!(store.objects("ConfigMap").len(), 1);
        assert!(store.objects("Service").is_empty());
    }

    /// Writes the object again after every read so that the version a caller saw is stale.
    struct ConcurrentWriter {
        inner: MemoryStore,
    }

    #[async_trait]
    impl ClusterStore for ConcurrentWriter {
        async fn create(&self, manifest: &Manifest) -> kube::Result<Manifest> {
            self.inner.create(manifest).await
        }

        async fn get(
            &self,
            object_type: &ObjectType,
            namespace: &str,
            name: &str,
        ) -> kube::Result<Manifest> {
            let existing = self.inner.get(object_type, namespace, name).await?;
            self.inner.insert(existing.clone());
            Ok(existing)
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
            self.inner.list(object_type, namespace, labels).await
        }
    }

    #[tokio::test]
    async fn stale_version_is_surfaced_as_conflict() {
        let store = ConcurrentWriter {
            inner: MemoryStore::new(),
        };
        upsert(&store, &config_map("test-a", "one")).await.unwrap();
        let error = upsert(&store, &config_map("test-a", "two"))
            .await
            .unwrap_err();
        assert!(error.is_conflict(), "{}", error);
        assert!(matches!(error, Error::Replace { .. }));
    }

    #[test]
    fn set_pointer_creates_intermediate_objects() {
        let mut value = json!({ "spec": { "ports": [] } });
        set_pointer(&mut value, "/spec/clusterIP", json!("10.96.0.2"));
        set_pointer(&mut value, "/status/loadBalancer/ingress", json!([]));
        set_pointer(&mut value, "/spec/ports/name", json!("ignored"));
        assert_eq!(
            value,
            json!({
                "spec": { "ports": [], "clusterIP": "10.96.0.2" },
                "status": { "loadBalancer": { "ingress": [] } }
            })
        );
    }
}
