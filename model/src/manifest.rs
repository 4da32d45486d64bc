use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::core::{ApiResource, DynamicObject};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Identifies the kind of a [`Manifest`] and how to reach it in the API.
#[derive(Debug, Clone)]
pub struct ObjectType {
    resource: ApiResource,
    namespaced: bool,
}

impl ObjectType {
    pub fn namespaced<K>() -> Self
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Self {
            resource: ApiResource::erase::<K>(&()),
            namespaced: true,
        }
    }

    pub fn cluster<K>() -> Self
    where
        K: Resource<DynamicType = (), Scope = ClusterResourceScope>,
    {
        Self {
            resource: ApiResource::erase::<K>(&()),
            namespaced: false,
        }
    }

    pub fn kind(&self) -> &str {
        &self.resource.kind
    }

    pub fn api_resource(&self) -> &ApiResource {
        &self.resource
    }

    pub fn is_namespaced(&self) -> bool {
        self.namespaced
    }
}

/// A cluster object of any kind. Typed `k8s-openapi` objects are erased into a `Manifest` so that
/// heterogeneous batches can be applied in order.
#[derive(Debug, Clone)]
pub struct Manifest {
    object_type: ObjectType,
    object: DynamicObject,
}

impl Manifest {
    pub fn namespaced<K>(object: &K) -> serde_json::Result<Self>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Serialize,
    {
        Self::from_typed(ObjectType::namespaced::<K>(), object)
    }

    pub fn cluster<K>(object: &K) -> serde_json::Result<Self>
    where
        K: Resource<DynamicType = (), Scope = ClusterResourceScope> + Serialize,
    {
        Self::from_typed(ObjectType::cluster::<K>(), object)
    }

    fn from_typed<K: Serialize>(object_type: ObjectType, object: &K) -> serde_json::Result<Self> {
        let object: DynamicObject = serde_json::from_value(serde_json::to_value(object)?)?;
        Ok(Self {
            object_type,
            object,
        })
    }

    /// Wraps an object returned by the API, which has the same type as `self`.
    pub fn with_object(&self, object: DynamicObject) -> Self {
        Self {
            object_type: self.object_type.clone(),
            object,
        }
    }

    pub fn from_parts(object_type: ObjectType, object: DynamicObject) -> Self {
        Self {
            object_type,
            object,
        }
    }

    /// Converts the manifest back into its typed representation.
    pub fn parse<K: DeserializeOwned>(&self) -> serde_json::Result<K> {
        serde_json::from_value(serde_json::to_value(&self.object)?)
    }

    pub fn object_type(&self) -> &ObjectType {
        &self.object_type
    }

    pub fn object(&self) -> &DynamicObject {
        &self.object
    }

    pub fn kind(&self) -> &str {
        self.object_type.kind()
    }

    pub fn name(&self) -> String {
        self.object.name_any()
    }

    /// The namespace of the object, `""` for cluster scoped kinds.
    pub fn namespace(&self) -> String {
        self.object.namespace().unwrap_or_default()
    }

    pub fn labels(&self) -> &std::collections::BTreeMap<String, String> {
        self.object.labels()
    }

    pub fn resource_version(&self) -> Option<String> {
        self.object.resource_version()
    }

    pub fn set_resource_version(&mut self, resource_version: Option<String>) {
        self.object.metadata.resource_version = resource_version;
    }

    /// Everything except `apiVersion`, `kind` and `metadata`.
    pub fn data(&self) -> &Value {
        &self.object.data
    }

    pub fn data_mut(&mut self) -> &mut Value {
        &mut self.object.data
    }
}

impl Display for Manifest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.name())
    }
}
