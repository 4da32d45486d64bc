/*!

Publishing build output to the artifact repository.

The [`Publisher`] uploads a directory tree into a bucket, keeping the layout of the tree below an
optional prefix. The [`Deployer`] builds a project with a [`BuildTool`], makes sure the repository
is installed and reachable, and publishes the build output.

!*/

mod deploy;
mod maven;
mod storage;

pub use deploy::{BuildError, BuildTool, DeployOptions, Deployer, Error as DeployError, StepError};
pub use maven::Maven;
#[cfg(any(test, feature = "mock"))]
pub use storage::MemoryStorage;
pub use storage::{
    ObjectStorage, S3Connector, S3Storage, StorageConnector, StorageError, StorageResult,
};

use async_recursion::async_recursion;
use log::{debug, info, warn};
use snafu::{ensure, ResultExt, Snafu};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Invalid destination '{}': expected 'bucket[/prefix]'", destination))]
    InvalidDestination { destination: String },

    #[snafu(display("Unable to check whether bucket '{}' exists: {}", bucket, source))]
    BucketExists {
        bucket: String,
        source: StorageError,
    },

    #[snafu(display("Unable to create bucket '{}': {}", bucket, source))]
    MakeBucket {
        bucket: String,
        source: StorageError,
    },

    #[snafu(display("Unable to read directory '{}': {}", path.display(), source))]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to read '{}': {}", path, source))]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Unable to upload '{}': {}", path, source))]
    Upload { path: String, source: StorageError },
}

/// Where and how to reach the object storage. Built for a single publish and never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct PublishDestination {
    /// `host:port` of the server.
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub use_ssl: bool,
}

impl PublishDestination {
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}", scheme, self.endpoint)
    }
}

impl std::fmt::Debug for PublishDestination {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishDestination")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("use_ssl", &self.use_ssl)
            .finish_non_exhaustive()
    }
}

/// A bucket and a key prefix, parsed from `bucket[/prefix...]`. Empty path segments are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPath {
    pub bucket: String,
    pub prefix: String,
}

impl BucketPath {
    pub fn parse(destination: &str) -> Result<Self> {
        let mut segments = destination.split('/').filter(|s| !s.is_empty());
        let bucket = segments.next().unwrap_or_default().to_string();
        ensure!(
            !bucket.is_empty(),
            InvalidDestinationSnafu { destination }
        );
        Ok(Self {
            bucket,
            prefix: segments.collect::<Vec<_>>().join("/"),
        })
    }

    /// The object key for a path relative to the published directory.
    pub fn key(&self, relative: &str) -> String {
        if self.prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.prefix, relative)
        }
    }
}

impl Display for BucketPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.bucket)
        } else {
            write!(f, "{}/{}", self.bucket, self.prefix)
        }
    }
}

/// Uploads directory trees to an [`ObjectStorage`].
#[derive(Clone)]
pub struct Publisher {
    storage: Arc<dyn ObjectStorage>,
}

impl Publisher {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Uploads every regular file below `local_dir` to `destination` (`bucket[/prefix]`) and
    /// returns the number of uploaded files. The bucket is created if needed. Stops at the first
    /// file that cannot be uploaded.
    pub async fn publish(&self, local_dir: &Path, destination: &str) -> Result<usize> {
        let destination = BucketPath::parse(destination)?;
        info!(
            "Publishing '{}' to '{}'",
            local_dir.display(),
            destination
        );
        self.ensure_bucket(&destination.bucket).await?;
        let uploaded = self.upload_dir(&destination, local_dir, "").await?;
        info!("Published {} files to '{}'", uploaded, destination);
        Ok(uploaded)
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        if self
            .storage
            .bucket_exists(bucket)
            .await
            .context(BucketExistsSnafu { bucket })?
        {
            return Ok(());
        }
        if let Err(e) = self.storage.make_bucket(bucket).await {
            // Somebody else may have created it in the meantime.
            if self
                .storage
                .bucket_exists(bucket)
                .await
                .context(BucketExistsSnafu { bucket })?
            {
                warn!("Bucket '{}' was created concurrently: {}", bucket, e);
                return Ok(());
            }
            return Err(e).context(MakeBucketSnafu { bucket });
        }
        debug!("Created bucket '{}'", bucket);
        Ok(())
    }

    /// `relative` is the path of `dir` below the published directory, with `/` separators.
    #[async_recursion]
    async fn upload_dir(
        &self,
        destination: &BucketPath,
        dir: &Path,
        relative: &str,
    ) -> Result<usize> {
        let mut read_dir = tokio::fs::read_dir(dir)
            .await
            .context(ReadDirSnafu { path: dir })?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .context(ReadDirSnafu { path: dir })?
        {
            entries.push(entry);
        }
        entries.sort_by_key(|entry| entry.file_name());

        let mut uploaded = 0;
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = if relative.is_empty() {
                name
            } else {
                format!("{}/{}", relative, name)
            };
            let file_type = entry
                .file_type()
                .await
                .context(ReadFileSnafu { path: &child })?;
            // Links to files are uploaded with the content of their target; links to directories
            // are not walked.
            let is_file = if file_type.is_symlink() {
                tokio::fs::metadata(entry.path())
                    .await
                    .context(ReadFileSnafu { path: &child })?
                    .is_file()
            } else {
                file_type.is_file()
            };
            if file_type.is_dir() {
                uploaded += self.upload_dir(destination, &entry.path(), &child).await?;
            } else if is_file {
                let content = tokio::fs::read(entry.path())
                    .await
                    .context(ReadFileSnafu { path: &child })?;
                let key = destination.key(&child);
                debug!("Uploading '{}' to '{}'", child, key);
                self.storage
                    .put_object(&destination.bucket, &key, content)
                    .await
                    .context(UploadSnafu { path: &child })?;
                uploaded += 1;
            } else {
                debug!("Skipping '{}', it is not a regular file", child);
            }
        }
        Ok(uploaded)
    }
}
