#![cfg(feature = "integ")]

use selftest::Cluster;
use std::sync::Arc;
use testrun_model::clients::KubeStore;
use testrun_model::repository::{Repository, RepositoryOptions};
use testrun_model::system::{install_controller, ControllerOptions, CONTROLLER_DEPLOYMENT};

#[tokio::test]
async fn concurrent_installs_converge() {
    let cluster = Cluster::new("repository-install").unwrap();
    let client = cluster.k8s_client().await.unwrap();
    let repository = Repository::new(
        Arc::new(KubeStore::new(client.clone())),
        "default",
        RepositoryOptions::default(),
    );
    assert!(!repository.is_installed().await.unwrap());

    let (first, second) = tokio::join!(
        repository.ensure_installed(),
        repository.ensure_installed()
    );
    first.unwrap();
    second.unwrap();
    assert!(repository.is_installed().await.unwrap());

    let secrets = kube::Api::<k8s_openapi::api::core::v1::Secret>::namespaced(client, "default")
        .list(&kube::api::ListParams::default().labels(&format!(
            "{}={}",
            testrun_model::constants::LABEL_REPOSITORY_COMPONENT,
            testrun_model::constants::COMPONENT_SERVER
        )))
        .await
        .unwrap();
    assert_eq!(secrets.items.len(), 1);

    let credentials = repository.credentials().await.unwrap();
    assert_eq!(credentials.access_key.len(), 64);
    repository.ensure_installed().await.unwrap();
    assert_eq!(repository.credentials().await.unwrap(), credentials);
    assert_eq!(
        repository.endpoint().await.unwrap(),
        "http://testrun-repository:9000"
    );
}

#[tokio::test]
async fn controller_install_is_repeatable() {
    let cluster = Cluster::new("controller-install").unwrap();
    let client = cluster.k8s_client().await.unwrap();
    let store = KubeStore::new(client.clone());
    let options = ControllerOptions {
        image: "testrun-controller:integ".to_string(),
        image_pull_secret: None,
    };
    install_controller(&store, &options).await.unwrap();
    install_controller(&store, &options).await.unwrap();
    cluster
        .wait_for_object(
            CONTROLLER_DEPLOYMENT,
            kube::Api::<k8s_openapi::api::apps::v1::Deployment>::namespaced(
                client,
                testrun_model::constants::NAMESPACE,
            ),
        )
        .await
        .unwrap();
}
