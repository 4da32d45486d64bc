use super::action::with_phase;
use super::context::ActionContext;
use super::test_pod::{RepositoryAccess, TestPodBuilder};
use crate::error::{self, Result};
use k8s_openapi::api::rbac::v1::RoleBinding;
use log::{debug, info};
use snafu::ResultExt;
use std::sync::Arc;
use testrun_model::clients::{ClusterStore, HttpStatusCode};
use testrun_model::constants::VIEWER;
use testrun_model::repository::{Repository, RepositoryOptions};
use testrun_model::system::{viewer_role, viewer_role_binding, viewer_service_account};
use testrun_model::upsert::upsert_batch;
use testrun_model::{CrdExt, Manifest, ObjectType, Phase, TestRun};

/// Submits the config map and pod of `test_run` and moves it to `Running`. Every step can be
/// repeated, so a failed start is retried from `Pending`.
pub(super) async fn start(test_run: &TestRun, ctx: &ActionContext) -> Result<TestRun> {
    let test_name = test_run.object_name();
    let namespace = test_run.object_namespace();
    ensure_viewer(ctx.store.as_ref(), test_name, namespace).await?;

    let builder = TestPodBuilder {
        test_run,
        image: &ctx.config.test_image,
        repository: repository_access(ctx, namespace).await?,
    };
    let manifests = vec![
        Manifest::namespaced(&builder.config_map()).context(error::ManifestSnafu {
            test_name,
            what: "config map",
        })?,
        Manifest::namespaced(&builder.pod()).context(error::ManifestSnafu {
            test_name,
            what: "pod",
        })?,
    ];
    upsert_batch(ctx.store.as_ref(), &manifests)
        .await
        .context(error::StartSnafu { test_name })?;
    info!("Started test run '{}'", test_name);
    Ok(with_phase(test_run, Phase::Running))
}

/// Creates the identity test pods run as, unless its role binding exists.
async fn ensure_viewer(store: &dyn ClusterStore, test_name: &str, namespace: &str) -> Result<()> {
    let existing = store
        .get(&ObjectType::namespaced::<RoleBinding>(), namespace, VIEWER)
        .await;
    match existing {
        Ok(_) => return Ok(()),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e).context(error::GetViewerSnafu { namespace }),
    }
    debug!("Creating the viewer in namespace '{}'", namespace);
    let manifests = vec![
        Manifest::namespaced(&viewer_service_account(namespace)).context(error::ManifestSnafu {
            test_name,
            what: "viewer service account",
        })?,
        Manifest::namespaced(&viewer_role(namespace)).context(error::ManifestSnafu {
            test_name,
            what: "viewer role",
        })?,
        Manifest::namespaced(&viewer_role_binding(namespace)).context(error::ManifestSnafu {
            test_name,
            what: "viewer role binding",
        })?,
    ];
    upsert_batch(store, &manifests)
        .await
        .context(error::CreateViewerSnafu { namespace })?;
    Ok(())
}

/// How to reach the repository of `namespace`, if one has been installed. This never installs
/// the repository.
async fn repository_access(
    ctx: &ActionContext,
    namespace: &str,
) -> Result<Option<RepositoryAccess>> {
    let repository = Repository::new(
        Arc::clone(&ctx.store),
        namespace,
        RepositoryOptions::default(),
    );
    if !repository
        .is_installed()
        .await
        .context(error::RepositorySnafu { namespace })?
    {
        return Ok(None);
    }
    Ok(Some(RepositoryAccess {
        url: repository
            .endpoint()
            .await
            .context(error::RepositorySnafu { namespace })?,
        bucket: ctx.config.repository_bucket.clone(),
        credentials: repository
            .credentials()
            .await
            .context(error::RepositorySnafu { namespace })?,
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::error::Error;
    use k8s_openapi::api::core::v1::Pod;
    use testrun_model::clients::MemoryStore;
    use testrun_model::constants::{ENV_S3_REPOSITORY_ACCESS_KEY, ENV_S3_REPOSITORY_URL};
    use testrun_model::{SourceFile, TestRunSpec, TestRunStatus};

    fn pending(namespace: &str) -> TestRun {
        let mut test_run = TestRun::new(
            "login",
            TestRunSpec {
                source: SourceFile {
                    name: "login.feature".into(),
                    content: "Feature: login".into(),
                },
                settings: None,
                env: vec!["GREETING=hello".into()],
            },
        );
        test_run.metadata.namespace = Some(namespace.into());
        test_run.status = Some(TestRunStatus {
            phase: Phase::Pending,
            test_id: "id".into(),
        });
        test_run
    }

    fn context(store: Arc<MemoryStore>) -> ActionContext {
        ActionContext {
            store,
            config: ControllerConfig::default(),
        }
    }

    fn env_names(pod: &Pod) -> Vec<String> {
        pod.spec.as_ref().unwrap().containers[0]
            .env
            .iter()
            .flatten()
            .map(|var| var.name.clone())
            .collect()
    }

    #[tokio::test]
    async fn start_submits_viewer_config_map_and_pod() {
        let store = Arc::new(MemoryStore::new());
        let updated = start(&pending("tests"), &context(store.clone()))
            .await
            .unwrap();
        assert_eq!(updated.phase(), Some(Phase::Running));
        assert_eq!(updated.test_id(), "id");
        assert_eq!(
            store.operations(),
            vec![
                "create ServiceAccount testrun-viewer",
                "create Role testrun-viewer",
                "create RoleBinding testrun-viewer",
                "create ConfigMap test-login",
                "create Pod test-login",
            ]
        );
        let pod: Pod = store
            .object("Pod", "tests", "test-login")
            .unwrap()
            .parse()
            .unwrap();
        assert!(!env_names(&pod).contains(&ENV_S3_REPOSITORY_URL.to_string()));
    }

    #[tokio::test]
    async fn start_twice_replaces() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        start(&pending("tests"), &ctx).await.unwrap();
        let first: Pod = store
            .object("Pod", "tests", "test-login")
            .unwrap()
            .parse()
            .unwrap();

        start(&pending("tests"), &ctx).await.unwrap();
        let second: Pod = store
            .object("Pod", "tests", "test-login")
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(first.spec, second.spec);
        let operations = store.operations();
        assert_eq!(
            &operations[5..],
            &["replace ConfigMap test-login", "replace Pod test-login"]
        );
    }

    #[tokio::test]
    async fn installed_repository_is_wired_in() {
        let store = Arc::new(MemoryStore::new());
        Repository::new(store.clone(), "tests", RepositoryOptions::default())
            .ensure_installed()
            .await
            .unwrap();
        start(&pending("tests"), &context(store.clone()))
            .await
            .unwrap();
        let pod: Pod = store
            .object("Pod", "tests", "test-login")
            .unwrap()
            .parse()
            .unwrap();
        let names = env_names(&pod);
        assert!(names.contains(&ENV_S3_REPOSITORY_URL.to_string()));
        assert!(names.contains(&ENV_S3_REPOSITORY_ACCESS_KEY.to_string()));
    }

    #[tokio::test]
    async fn partially_installed_repository_is_not_wired_in() {
        let store = Arc::new(MemoryStore::new());
        store.fail_creates_of("Service");
        Repository::new(store.clone(), "tests", RepositoryOptions::default())
            .ensure_installed()
            .await
            .unwrap_err();
        store.clear_failures();

        let updated = start(&pending("tests"), &context(store.clone()))
            .await
            .unwrap();
        assert_eq!(updated.phase(), Some(Phase::Running));
        let pod: Pod = store
            .object("Pod", "tests", "test-login")
            .unwrap()
            .parse()
            .unwrap();
        assert!(!env_names(&pod).contains(&ENV_S3_REPOSITORY_URL.to_string()));
    }

    #[tokio::test]
    async fn failed_submit_leaves_phase() {
        let store = Arc::new(MemoryStore::new());
        store.fail_creates_of("Pod");
        let error = start(&pending("tests"), &context(store.clone()))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Start { .. }), "{}", error);
        assert_eq!(store.objects("ConfigMap").len(), 1);
        assert!(store.objects("Pod").is_empty());
    }
}
