use super::{PublishDestination, Publisher, StorageConnector};
use crate::constants::DEFAULT_BUCKET;
use crate::repository::{self, Repository};
use crate::tunnel::PodDialer;
use async_trait::async_trait;
use log::info;
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long installing and connecting to the repository may take by default.
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Errors of a [`BuildTool`] are passed through as they are.
pub type BuildError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Knows how to identify and build a project.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// A stable identifier of the project, e.g. Maven coordinates.
    async fn project_id(&self, project_dir: &Path) -> std::result::Result<String, BuildError>;

    /// Builds the project and writes its artifacts into `staging_dir`.
    async fn stage(
        &self,
        project_dir: &Path,
        staging_dir: &Path,
    ) -> std::result::Result<(), BuildError>;
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    #[snafu(display("Unable to identify the project in '{}': {}", path.display(), source))]
    ProjectId { path: PathBuf, source: BuildError },

    #[snafu(display("Unable to deploy '{}': {}", project_id, source))]
    Deploy {
        project_id: String,
        source: StepError,
    },
}

impl Error {
    /// The identifier of the project that failed, if it was resolved.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Error::ProjectId { .. } => None,
            Error::Deploy { project_id, .. } => Some(project_id),
        }
    }
}

/// The step of a deployment that failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum StepError {
    #[snafu(display("unable to install the repository: {}", source))]
    Install { source: repository::Error },

    #[snafu(display("unable to read the repository credentials: {}", source))]
    Credentials { source: repository::Error },

    #[snafu(display("unable to build: {}", source))]
    Build { source: BuildError },

    #[snafu(display("unable to connect to the repository: {}", source))]
    Connect { source: repository::Error },

    #[snafu(display("unable to publish: {}", source))]
    Publish { source: super::Error },

    #[snafu(display("{} did not finish within {:?}", step, timeout))]
    Timeout { step: String, timeout: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    /// `bucket[/prefix]` to publish to.
    pub bucket: String,
    /// Shared by installing the repository and connecting to it.
    pub timeout: Duration,
    /// Reach the repository through its service instead of a tunnel. Only works from inside the
    /// cluster.
    pub direct: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            timeout: DEFAULT_DEPLOY_TIMEOUT,
            direct: false,
        }
    }
}

/// Builds projects and publishes their artifacts to the repository of a namespace.
pub struct Deployer {
    repository: Repository,
    build_tool: Arc<dyn BuildTool>,
    dialer: Arc<dyn PodDialer>,
    connector: Arc<dyn StorageConnector>,
    options: DeployOptions,
}

impl Deployer {
    pub fn new(
        repository: Repository,
        build_tool: Arc<dyn BuildTool>,
        dialer: Arc<dyn PodDialer>,
        connector: Arc<dyn StorageConnector>,
        options: DeployOptions,
    ) -> Self {
        Self {
            repository,
            build_tool,
            dialer,
            connector,
            options,
        }
    }

    /// Builds the project in `project_dir` into `staging_dir` and publishes the result. Returns
    /// the project id. Any tunnel opened for the upload is closed before this returns.
    pub async fn deploy(&self, project_dir: &Path, staging_dir: &Path) -> Result<String> {
        let project_id = self
            .build_tool
            .project_id(project_dir)
            .await
            .context(ProjectIdSnafu { path: project_dir })?;
        info!("Deploying '{}'", project_id);
        let cancel = CancellationToken::new();
        let _tunnel_guard = cancel.clone().drop_guard();
        self.run(project_dir, staging_dir, cancel)
            .await
            .context(DeploySnafu {
                project_id: &project_id,
            })?;
        info!("Deployed '{}'", project_id);
        Ok(project_id)
    }

    async fn run(
        &self,
        project_dir: &Path,
        staging_dir: &Path,
        cancel: CancellationToken,
    ) -> std::result::Result<(), StepError> {
        let deadline = Instant::now() + self.options.timeout;
        tokio::time::timeout_at(deadline, self.repository.ensure_installed())
            .await
            .map_err(|_| self.timeout("installing the repository"))?
            .context(InstallSnafu)?;
        let credentials = self
            .repository
            .credentials()
            .await
            .context(CredentialsSnafu)?;

        self.build_tool
            .stage(project_dir, staging_dir)
            .await
            .context(BuildSnafu)?;

        let endpoint = tokio::time::timeout_at(
            deadline,
            self.repository
                .open_connection(self.options.direct, Arc::clone(&self.dialer), cancel),
        )
        .await
        .map_err(|_| self.timeout("connecting to the repository"))?
        .context(ConnectSnafu)?;

        let destination = PublishDestination {
            endpoint,
            access_key_id: credentials.access_key,
            access_key_secret: credentials.secret_key,
            use_ssl: false,
        };
        Publisher::new(self.connector.connect(&destination))
            .publish(staging_dir, &self.options.bucket)
            .await
            .context(PublishSnafu)?;
        Ok(())
    }

    fn timeout(&self, step: &str) -> StepError {
        StepError::Timeout {
            step: step.to_string(),
            timeout: self.options.timeout,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clients::MemoryStore;
    use crate::publish::MemoryStorage;
    use crate::repository::RepositoryOptions;
    use crate::tunnel::DialResult;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Writes a single artifact, or fails when told to.
    #[derive(Default)]
    struct FakeBuild {
        fail: AtomicBool,
    }

    #[async_trait]
    impl BuildTool for FakeBuild {
        async fn project_id(
            &self,
            _project_dir: &Path,
        ) -> std::result::Result<String, BuildError> {
            Ok("org.example:service:1.0".to_string())
        }

        async fn stage(
            &self,
            _project_dir: &Path,
            staging_dir: &Path,
        ) -> std::result::Result<(), BuildError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("compilation failed".into());
            }
            let dir = staging_dir.join("org/example/service/1.0");
            fs::create_dir_all(&dir)?;
            fs::write(dir.join("service-1.0.jar"), b"jar")?;
            Ok(())
        }
    }

    struct UnusedDialer;

    #[async_trait]
    impl PodDialer for UnusedDialer {
        async fn dial(&self, pod: &str, _port: u16) -> DialResult {
            Err(format!("unexpected dial to '{}'", pod).into())
        }
    }

    fn deployer(build: Arc<FakeBuild>) -> (Arc<MemoryStore>, Arc<MemoryStorage>, Deployer) {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let repository = Repository::new(store.clone(), "tests", RepositoryOptions::default());
        let deployer = Deployer::new(
            repository,
            build,
            Arc::new(UnusedDialer),
            Arc::new(storage.clone()),
            DeployOptions {
                bucket: "maven/releases".into(),
                direct: true,
                ..DeployOptions::default()
            },
        );
        (store, storage, deployer)
    }

    #[tokio::test]
    async fn deploy_installs_builds_and_publishes() {
        let staging = TempDir::new().unwrap();
        let (store, storage, deployer) = deployer(Arc::new(FakeBuild::default()));
        let project_id = deployer
            .deploy(Path::new("."), staging.path())
            .await
            .unwrap();
        assert_eq!(project_id, "org.example:service:1.0");
        assert_eq!(store.objects("Deployment").len(), 1);

        let objects = storage.objects("maven").unwrap();
        assert_eq!(
            objects["releases/org/example/service/1.0/service-1.0.jar"],
            b"jar"
        );
        let destinations = storage.destinations();
        assert_eq!(destinations.len(), 1);
        assert_eq!(destinations[0].endpoint, "testrun-repository:9000");
        assert_eq!(destinations[0].access_key_id.len(), 64);
    }

    #[tokio::test]
    async fn failure_names_the_project() {
        let staging = TempDir::new().unwrap();
        let build = Arc::new(FakeBuild::default());
        build.fail.store(true, Ordering::SeqCst);
        let (_, storage, deployer) = deployer(build);
        let error = deployer
            .deploy(Path::new("."), staging.path())
            .await
            .unwrap_err();
        assert_eq!(error.project_id(), Some("org.example:service:1.0"));
        assert!(matches!(
            error,
            Error::Deploy {
                source: StepError::Build { .. },
                ..
            }
        ));
        assert!(storage.objects("maven").is_none());
    }

    #[tokio::test]
    async fn failed_install_is_reported() {
        let staging = TempDir::new().unwrap();
        let (store, _, deployer) = deployer(Arc::new(FakeBuild::default()));
        store.fail_creates_of("Service");
        let error = deployer
            .deploy(Path::new("."), staging.path())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::Deploy {
                source: StepError::Install { .. },
                ..
            }
        ));
    }
}
