use crate::clients::ClusterStore;
use crate::manifest::ObjectType;
use k8s_openapi::api::core::v1::Pod;
use log::{trace, warn};
use snafu::Snafu;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long [`wait_for_ready`] sleeps between two lists by default.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const CONTAINERS_READY: &str = "ContainersReady";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Cancelled while waiting for a ready pod in '{}'", namespace))]
    Cancelled { namespace: String },
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

/// Lists the pods in `namespace` matching `labels` until one of them reports all of its
/// containers ready, and returns that pod's name.
///
/// Errors from the list call are logged and treated as "not ready yet". Cancellation is checked
/// before each list and during each sleep, so the function returns at most one `interval` after
/// `cancel` fires.
pub async fn wait_for_ready(
    store: &dyn ClusterStore,
    namespace: &str,
    labels: &BTreeMap<String, String>,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<String> {
    let pod_type = ObjectType::namespaced::<Pod>();
    loop {
        if cancel.is_cancelled() {
            return CancelledSnafu { namespace }.fail();
        }
        match store.list(&pod_type, namespace, labels).await {
            Ok(pods) => {
                if let Some(name) = pods
                    .iter()
                    .filter_map(|manifest| manifest.parse::<Pod>().ok())
                    .find(is_ready)
                    .and_then(|pod| pod.metadata.name)
                {
                    return Ok(name);
                }
                trace!("no ready pod in '{}' yet", namespace);
            }
            Err(e) => warn!("Unable to list pods in '{}': {}", namespace, e),
        }
        tokio::select! {
            _ = cancel.cancelled() => return CancelledSnafu { namespace }.fail(),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Whether the pod's `ContainersReady` condition is `True`.
pub fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == CONTAINERS_READY && c.status == "True")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clients::MemoryStore;
    use crate::manifest::Manifest;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use kube::api::ObjectMeta;
    use maplit::btreemap;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn labels() -> BTreeMap<String, String> {
        btreemap! { "app".to_string() => "repository".to_string() }
    }

    fn pod(name: &str, ready: &str) -> Manifest {
        Manifest::namespaced(&Pod {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("default".into()),
                labels: Some(labels()),
                ..ObjectMeta::default()
            },
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: CONTAINERS_READY.into(),
                    status: ready.into(),
                    ..PodCondition::default()
                }]),
                ..PodStatus::default()
            }),
            ..Pod::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_the_ready_pod() {
        let store = MemoryStore::new();
        store.insert(pod("starting", "False"));
        store.insert(pod("serving", "True"));
        let name = wait_for_ready(
            &store,
            "default",
            &labels(),
            Duration::from_millis(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(name, "serving");
    }

    #[tokio::test]
    async fn list_errors_are_tolerated() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_lists(3);
        store.insert(pod("serving", "True"));
        let name = wait_for_ready(
            store.as_ref(),
            "default",
            &labels(),
            Duration::from_millis(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(name, "serving");
    }

    #[tokio::test]
    async fn pod_becoming_ready_later_is_found() {
        let store = Arc::new(MemoryStore::new());
        store.insert(pod("serving", "False"));
        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.insert(pod("serving", "True"));
        });
        let name = wait_for_ready(
            store.as_ref(),
            "default",
            &labels(),
            Duration::from_millis(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(name, "serving");
    }

    #[tokio::test]
    async fn cancellation_ends_the_wait_within_one_interval() {
        let store = MemoryStore::new();
        store.insert(pod("starting", "False"));
        let cancel = CancellationToken::new();
        let interval = Duration::from_millis(200);
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let error = wait_for_ready(&store, "default", &labels(), interval, &cancel)
            .await
            .unwrap_err();
        assert!(error.is_cancelled());
        assert!(started.elapsed() < Duration::from_millis(50) + interval);
    }

    #[tokio::test]
    async fn already_cancelled_does_not_list() {
        let store = MemoryStore::new();
        store.insert(pod("serving", "True"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = wait_for_ready(&store, "default", &labels(), DEFAULT_POLL_INTERVAL, &cancel)
            .await
            .unwrap_err();
        assert!(error.is_cancelled());
    }
}
