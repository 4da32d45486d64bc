use crate::constants::{APP_TESTRUN, LABEL_APP, LABEL_TEST, LABEL_TEST_ID};
use crate::TestRun;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use std::collections::BTreeMap;

/// Provides some conveniences for querying a `kube-rs` object.
pub trait CrdExt {
    /// Returns this objects `ObjectMeta` information (i.e. the `metadata` field). You implement
    /// this be returning `&self.metadata`. This allows the rest of this trait's functions to be
    /// implemented for you.
    fn object_meta(&self) -> &ObjectMeta;

    /// Returns the object.metadata.name field, unwrapping a potential `None` with `""`. In
    /// practice, an object's name cannot be missing since this is how we `GET` an object in the
    /// first place, so we do away with the `Option` for convenience. This is named `object_name`
    /// to avoid confusion with `ResourceExt`.
    fn object_name(&self) -> &str {
        self.object_meta().name.as_deref().unwrap_or("")
    }

    /// Returns the object.metadata.namespace field, or `""` for cluster scoped objects.
    fn object_namespace(&self) -> &str {
        self.object_meta().namespace.as_deref().unwrap_or("")
    }

    /// Has someone requested that the object be deleted.
    fn is_delete_requested(&self) -> bool {
        self.object_meta().deletion_timestamp.is_some()
    }
}

impl CrdExt for TestRun {
    fn object_meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl TestRun {
    /// The deterministic name of the config map and pod created for this run.
    pub fn resource_name(&self) -> String {
        format!("test-{}", self.object_name())
    }

    /// Labels shared by every object created on behalf of this run.
    pub fn child_labels(&self) -> BTreeMap<String, String> {
        [
            (LABEL_APP, APP_TESTRUN),
            (LABEL_TEST, self.object_name()),
            (LABEL_TEST_ID, self.test_id()),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
    }

    /// An owner reference that hands deletion of child objects to the cluster's garbage
    /// collector.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: TestRun::api_version(&()).into_owned(),
            kind: TestRun::kind(&()).into_owned(),
            name: self.object_name().to_owned(),
            uid: self.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Metadata for a child object of this run.
    pub fn child_meta(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.resource_name()),
            namespace: Some(self.object_namespace().to_owned()),
            labels: Some(self.child_labels()),
            owner_references: Some(vec![self.owner_reference()]),
            ..ObjectMeta::default()
        }
    }
}
