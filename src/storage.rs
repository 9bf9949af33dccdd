use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;

// 1. StorageService Contract
/// StorageService
///
/// The object store holding uploaded note files. Handlers and the note manager only see this
/// trait, so the real S3 client and the in-memory mock are interchangeable.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used by the local setup to provision MinIO.
    async fn ensure_bucket_exists(&self);

    /// Writes `bytes` under `key` and returns the public URL of the stored object.
    async fn store(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, String>;

    /// Deletes the object behind `url`. `Ok(false)` means it was already gone.
    async fn remove(&self, url: &str) -> Result<bool, String>;
}

/// Object key of a stored file: the last path segment of its URL.
pub fn key_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let key = sanitize_key(path.rsplit('/').next().unwrap_or_default());
    (!key.is_empty()).then_some(key)
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// The concrete implementation using the AWS SDK for S3. `force_path_style(true)` is required
/// for MinIO-style endpoints.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3StorageClient {
    /// new
    ///
    /// Constructs the S3 client from the configured endpoint and credentials.
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_base_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket fails harmlessly when the bucket is already there.
        let _ = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await;
    }

    async fn store(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, String> {
        let key = sanitize_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        Ok(format!("{}/{}", self.public_base_url, key))
    }

    async fn remove(&self, url: &str) -> Result<bool, String> {
        let Some(key) = key_from_url(url) else {
            return Ok(false);
        };

        match self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => {}
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => return Ok(false),
            Err(e) => return Err(e.to_string()),
        }

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(true)
    }
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`) and empty segments from a key.
fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// In-memory object store for tests. Objects are shared between clones, so a test can keep
/// a handle and inspect what the application stored or removed.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

pub const MOCK_BASE_URL: &str = "http://localhost:9000/mock-bucket";

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub async fn contains(&self, url: &str) -> bool {
        match key_from_url(url) {
            Some(key) => self.objects.lock().await.contains_key(&key),
            None => false,
        }
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn store(&self, key: &str, _content_type: &str, bytes: Vec<u8>) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }
        let key = sanitize_key(key);
        self.objects.lock().await.insert(key.clone(), bytes);
        Ok(format!("{}/{}", MOCK_BASE_URL, key))
    }

    async fn remove(&self, url: &str) -> Result<bool, String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }
        Ok(match key_from_url(url) {
            Some(key) => self.objects.lock().await.remove(&key).is_some(),
            None => false,
        })
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
