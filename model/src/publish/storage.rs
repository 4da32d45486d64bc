use super::PublishDestination;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::types::ByteStream;
use aws_types::region::Region;
use std::sync::Arc;

/// Errors of an [`ObjectStorage`] are passed through as they are.
pub type StorageError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// The object storage API the publisher needs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    async fn make_bucket(&self, bucket: &str) -> StorageResult<()>;

    async fn put_object(&self, bucket: &str, key: &str, content: Vec<u8>) -> StorageResult<()>;
}

/// Creates an [`ObjectStorage`] client once the destination is known.
pub trait StorageConnector: Send + Sync {
    fn connect(&self, destination: &PublishDestination) -> Arc<dyn ObjectStorage>;
}

/// The repository server does not care about regions but the SDK requires one.
const REGION: &str = "us-east-1";

/// An S3 compatible object storage.
#[derive(Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
}

impl S3Storage {
    pub fn new(destination: &PublishDestination) -> Self {
        let credentials = Credentials::new(
            destination.access_key_id.clone(),
            destination.access_key_secret.clone(),
            None,
            None,
            "static",
        );
        let config = aws_sdk_s3::Config::builder()
            .region(Region::new(REGION))
            .endpoint_url(destination.url())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        let output = self.client.list_buckets().send().await?;
        Ok(output
            .buckets()
            .unwrap_or_default()
            .iter()
            .any(|b| b.name() == Some(bucket)))
    }

    async fn make_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client.create_bucket().bucket(bucket).send().await?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, content: Vec<u8>) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(content))
            .send()
            .await?;
        Ok(())
    }
}

/// Connects to destinations with [`S3Storage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Connector;

impl StorageConnector for S3Connector {
    fn connect(&self, destination: &PublishDestination) -> Arc<dyn ObjectStorage> {
        Arc::new(S3Storage::new(destination))
    }
}

#[cfg(any(test, feature = "mock"))]
pub use memory::MemoryStorage;

#[cfg(any(test, feature = "mock"))]
mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::{Mutex, MutexGuard};

    /// An in-memory [`ObjectStorage`]. It is also a [`StorageConnector`] that hands out itself and
    /// remembers the destinations it was asked for.
    #[derive(Default)]
    pub struct MemoryStorage {
        inner: Mutex<Inner>,
    }

    #[derive(Default)]
    struct Inner {
        buckets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
        failing_keys: HashSet<String>,
        racing_bucket_creation: bool,
        destinations: Vec<PublishDestination>,
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> MutexGuard<'_, Inner> {
            self.inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// The objects of `bucket`, `None` if the bucket does not exist.
        pub fn objects(&self, bucket: &str) -> Option<BTreeMap<String, Vec<u8>>> {
            self.lock().buckets.get(bucket).cloned()
        }

        /// Uploads of `key` fail.
        pub fn fail_puts_of(&self, key: &str) {
            self.lock().failing_keys.insert(key.to_string());
        }

        /// Makes the next `make_bucket` lose against a concurrent creation of the same bucket.
        pub fn race_bucket_creation(&self) {
            self.lock().racing_bucket_creation = true;
        }

        pub fn destinations(&self) -> Vec<PublishDestination> {
            self.lock().destinations.clone()
        }
    }

    #[async_trait]
    impl ObjectStorage for MemoryStorage {
        async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
            Ok(self.lock().buckets.contains_key(bucket))
        }

        async fn make_bucket(&self, bucket: &str) -> StorageResult<()> {
            let mut inner = self.lock();
            let exists = inner.buckets.contains_key(bucket);
            inner.buckets.entry(bucket.to_string()).or_default();
            if exists || std::mem::take(&mut inner.racing_bucket_creation) {
                return Err(format!("bucket '{}' already exists", bucket).into());
            }
            Ok(())
        }

        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            content: Vec<u8>,
        ) -> StorageResult<()> {
            let mut inner = self.lock();
            if inner.failing_keys.contains(key) {
                return Err(format!("injected failure for '{}'", key).into());
            }
            inner
                .buckets
                .get_mut(bucket)
                .ok_or_else(|| format!("bucket '{}' does not exist", bucket))?
                .insert(key.to_string(), content);
            Ok(())
        }
    }

    impl StorageConnector for Arc<MemoryStorage> {
        fn connect(&self, destination: &PublishDestination) -> Arc<dyn ObjectStorage> {
            self.lock().destinations.push(destination.clone());
            self.clone()
        }
    }
}
