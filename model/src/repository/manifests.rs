use super::credentials::Credentials;
use crate::constants::{
    ACCESS_KEY_ENTRY, APP_COMPONENT, APP_MANAGED_BY, APP_NAME, APP_PART_OF, COMPONENT_SERVER,
    LABEL_REPOSITORY_COMPONENT, REPOSITORY, REPOSITORY_PORT, SECRET_KEY_ENTRY, TESTRUN,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Secret, SecretKeySelector, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use maplit::btreemap;
use std::collections::BTreeMap;

/// The name shared by every object of the repository.
pub(crate) const SERVER_NAME: &str = "testrun-repository";
const DATA_VOLUME: &str = "data";
const DATA_PATH: &str = "/data";

/// The label that identifies the repository's server objects.
pub(crate) fn server_labels() -> BTreeMap<String, String> {
    btreemap! { LABEL_REPOSITORY_COMPONENT.to_string() => COMPONENT_SERVER.to_string() }
}

fn meta(namespace: &str) -> ObjectMeta {
    let mut labels: BTreeMap<String, String> = btreemap! {
        APP_NAME => REPOSITORY,
        APP_COMPONENT => COMPONENT_SERVER,
        APP_MANAGED_BY => TESTRUN,
        APP_PART_OF => TESTRUN,
    }
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    labels.extend(server_labels());
    ObjectMeta {
        name: Some(SERVER_NAME.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        ..Default::default()
    }
}

/// Holds the generated keys. The server reads them as its root user and password.
pub(crate) fn secret(namespace: &str, credentials: &Credentials) -> Secret {
    Secret {
        metadata: meta(namespace),
        data: Some(btreemap! {
            credentials.access_key_entry.clone() => ByteString(credentials.access_key.clone().into_bytes()),
            credentials.secret_key_entry.clone() => ByteString(credentials.secret_key.clone().into_bytes()),
        }),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

pub(crate) fn claim(namespace: &str, storage_size: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(namespace),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(ResourceRequirements {
                requests: Some(btreemap! {
                    "storage".to_string() => Quantity(storage_size.to_string()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn key_from_secret(name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(SERVER_NAME.to_string()),
                key: key.to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn deployment(namespace: &str, image: &str) -> Deployment {
    Deployment {
        metadata: meta(namespace),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(server_labels()),
                ..Default::default()
            },
            // The data volume can only be mounted by one pod at a time.
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(server_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "server".to_string(),
                        image: Some(image.to_string()),
                        args: Some(vec!["server".to_string(), DATA_PATH.to_string()]),
                        env: Some(vec![
                            key_from_secret("MINIO_ROOT_USER", ACCESS_KEY_ENTRY),
                            key_from_secret("MINIO_ROOT_PASSWORD", SECRET_KEY_ENTRY),
                        ]),
                        ports: Some(vec![ContainerPort {
                            container_port: i32::from(REPOSITORY_PORT),
                            ..Default::default()
                        }]),
                        readiness_probe: Some(Probe {
                            http_get: Some(HTTPGetAction {
                                path: Some("/minio/health/ready".to_string()),
                                port: IntOrString::Int(i32::from(REPOSITORY_PORT)),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        volume_mounts: Some(vec![VolumeMount {
                            name: DATA_VOLUME.to_string(),
                            mount_path: DATA_PATH.to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: DATA_VOLUME.to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: SERVER_NAME.to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn service(namespace: &str) -> Service {
    Service {
        metadata: meta(namespace),
        spec: Some(ServiceSpec {
            selector: Some(server_labels()),
            ports: Some(vec![ServicePort {
                name: Some("api".to_string()),
                port: i32::from(REPOSITORY_PORT),
                target_port: Some(IntOrString::Int(i32::from(REPOSITORY_PORT))),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
