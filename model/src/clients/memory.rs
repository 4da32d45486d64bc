use super::http_status_code::{api_error, StatusCode};
use super::store::ClusterStore;
use crate::manifest::{Manifest, ObjectType};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// `(kind, namespace, name)` of a stored object.
type Key = (String, String, String);

/// An in-memory [`ClusterStore`] that behaves like the API server where it matters for testing:
///
/// - every write bumps a store-wide resource version,
/// - `replace` is rejected with `Conflict` unless it carries the current resource version,
/// - services get a cluster IP on create which cannot be changed by `replace`,
/// - the spec of a persistent volume claim cannot be changed by `replace`.
///
/// Failures can be injected for `list` and `create` calls.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Key, Manifest>,
    resource_version: u64,
    next_ip: u32,
    failing_lists: usize,
    failing_creates: HashSet<String>,
    operations: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every object of `kind` currently stored.
    pub fn objects(&self, kind: &str) -> Vec<Manifest> {
        self.lock()
            .objects
            .iter()
            .filter(|((k, _, _), _)| k == kind)
            .map(|(_, manifest)| manifest.clone())
            .collect()
    }

    /// A stored object, if it exists.
    pub fn object(&self, kind: &str, namespace: &str, name: &str) -> Option<Manifest> {
        self.lock()
            .objects
            .get(&(kind.to_string(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Store `manifest` as is, bypassing all checks. Useful for seeding objects that would be
    /// written by other parts of the cluster, e.g. pod status.
    pub fn insert(&self, mut manifest: Manifest) {
        let mut inner = self.lock();
        let version = inner.bump();
        manifest.set_resource_version(Some(version));
        inner.objects.insert(key_of(&manifest), manifest);
    }

    /// The next `count` calls to `list` fail with an internal error.
    pub fn fail_next_lists(&self, count: usize) {
        self.lock().failing_lists = count;
    }

    /// Every `create` of an object of `kind` fails with an internal error.
    pub fn fail_creates_of(&self, kind: &str) {
        self.lock().failing_creates.insert(kind.to_string());
    }

    /// Stops injecting failures.
    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.failing_lists = 0;
        inner.failing_creates.clear();
    }

    /// The write operations performed so far, e.g. `create ConfigMap test-a`.
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }
}

impl Inner {
    fn bump(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn allocate_ip(&mut self) -> String {
        self.next_ip += 1;
        format!("10.96.{}.{}", self.next_ip / 250, self.next_ip % 250 + 1)
    }
}

fn key_of(manifest: &Manifest) -> Key {
    key_for(
        manifest.object_type(),
        &manifest.namespace(),
        &manifest.name(),
    )
}

fn key_for(object_type: &ObjectType, namespace: &str, name: &str) -> Key {
    let namespace = if object_type.is_namespaced() {
        namespace
    } else {
        ""
    };
    (
        object_type.kind().to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn not_found(kind: &str, name: &str) -> kube::Error {
    api_error(
        StatusCode::NOT_FOUND,
        "NotFound",
        format!("{} \"{}\" not found", kind, name),
    )
}

fn invalid(manifest: &Manifest, field: &str) -> kube::Error {
    api_error(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid",
        format!("{} is invalid: {}: field is immutable", manifest, field),
    )
}

fn internal(operation: &str, kind: &str) -> kube::Error {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "InternalError",
        format!("injected failure on {} {}", operation, kind),
    )
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn create(&self, manifest: &Manifest) -> kube::Result<Manifest> {
        let mut inner = self.lock();
        if inner.failing_creates.contains(manifest.kind()) {
            return Err(internal("create", manifest.kind()));
        }
        let key = key_of(manifest);
        if inner.objects.contains_key(&key) {
            return Err(api_error(
                StatusCode::CONFLICT,
                "AlreadyExists",
                format!("{} already exists", manifest),
            ));
        }
        let mut created = manifest.clone();
        if created.kind() == "Service" && created.data().pointer("/spec/clusterIP").is_none() {
            let ip = inner.allocate_ip();
            if let Some(spec) = created
                .data_mut()
                .get_mut("spec")
                .and_then(Value::as_object_mut)
            {
                spec.insert("clusterIP".to_string(), Value::String(ip));
            }
        }
        let version = inner.bump();
        created.set_resource_version(Some(version));
        inner.operations.push(format!("create {}", created));
        inner.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn get(
        &self,
        object_type: &ObjectType,
        namespace: &str,
        name: &str,
    ) -> kube::Result<Manifest> {
        self.lock()
            .objects
            .get(&key_for(object_type, namespace, name))
            .cloned()
            .ok_or_else(|| not_found(object_type.kind(), name))
    }

    async fn replace(&self, manifest: &Manifest) -> kube::Result<Manifest> {
        let mut inner = self.lock();
        let key = key_of(manifest);
        let existing = inner
            .objects
            .get(&key)
            .ok_or_else(|| not_found(manifest.kind(), &manifest.name()))?;
        if existing.resource_version() != manifest.resource_version() {
            return Err(api_error(
                StatusCode::CONFLICT,
                "Conflict",
                format!(
                    "Operation cannot be fulfilled on {}: the object has been modified",
                    manifest
                ),
            ));
        }
        match manifest.kind() {
            "PersistentVolumeClaim"
                if existing.data().get("spec") != manifest.data().get("spec") =>
            {
                return Err(invalid(manifest, "spec"));
            }
            "Service"
                if existing.data().pointer("/spec/clusterIP")
                    != manifest.data().pointer("/spec/clusterIP") =>
            {
                return Err(invalid(manifest, "spec.clusterIP"));
            }
            _ => {}
        }
        let mut replaced = manifest.clone();
        let version = inner.bump();
        replaced.set_resource_version(Some(version));
        inner.operations.push(format!("replace {}", replaced));
        inner.objects.insert(key, replaced.clone());
        Ok(replaced)
    }

    async fn list(
        &self,
        object_type: &ObjectType,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> kube::Result<Vec<Manifest>> {
        let mut inner = self.lock();
        if inner.failing_lists > 0 {
            inner.failing_lists -= 1;
            return Err(internal("list", object_type.kind()));
        }
        Ok(inner
            .objects
            .iter()
            .filter(|((kind, ns, _), _)| {
                kind == object_type.kind() && (!object_type.is_namespaced() || ns == namespace)
            })
            .filter(|(_, manifest)| {
                labels
                    .iter()
                    .all(|(key, value)| manifest.labels().get(key) == Some(value))
            })
            .map(|(_, manifest)| manifest.clone())
            .collect())
    }
}
