//! Object-store transfer capability backed by S3
//!
//! The client is built once from [`S3Config`] and injected into the source
//! and destination adapters; nothing here is process-global.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use video_palette_common::{PaletteError, Result};

/// Region used when neither the config nor `AWS_REGION` names one
pub const DEFAULT_REGION: &str = "ap-southeast-1";

/// S3 client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// AWS region the client signs requests for
    pub region: String,

    /// Custom endpoint (`MinIO`, localstack); `None` for AWS S3
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            endpoint: std::env::var("AWS_ENDPOINT_URL").ok(),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
        }
    }
}

/// Get/put capability over a bucket and key
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open the object's content as a stream
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream>;

    /// Store the stream's content under the key
    async fn put(&self, bucket: &str, key: &str, body: ByteStream) -> Result<()>;
}

/// S3 object store
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Create a new S3 client from configuration
    #[must_use]
    pub fn new(config: S3Config) -> Self {
        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region))
            .behavior_version_latest();

        if !config.access_key_id.is_empty() {
            builder = builder.credentials_provider(Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,
                None,
                "video-palette-storage",
            ));
        }

        // Custom endpoints need path-style addressing
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

fn object_label(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        debug!("GET {}", object_label(bucket, key));
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                PaletteError::transfer(object_label(bucket, key), DisplayErrorContext(&e))
            })?;
        Ok(response.body)
    }

    async fn put(&self, bucket: &str, key: &str, body: ByteStream) -> Result<()> {
        debug!("PUT {}", object_label(bucket, key));
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                PaletteError::transfer(object_label(bucket, key), DisplayErrorContext(&e))
            })?;
        Ok(())
    }
}

/// In-memory object store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.lock()
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Vec<u8>>> {
        // A poisoned map is still a valid map
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        self.object(bucket, key)
            .map(ByteStream::from)
            .ok_or_else(|| PaletteError::transfer(object_label(bucket, key), "NoSuchKey"))
    }

    async fn put(&self, bucket: &str, key: &str, body: ByteStream) -> Result<()> {
        let data = body
            .collect()
            .await
            .map_err(|e| PaletteError::transfer(object_label(bucket, key), e))?
            .into_bytes();
        self.insert(bucket, key, data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_config_with_minio() {
        let config = S3Config {
            region: "us-east-1".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
        };
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        let _store = S3ObjectStore::new(config);
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryObjectStore::new();
        store
            .put("bucket", "a/b.csv", ByteStream::from(b"hello".to_vec()))
            .await
            .unwrap();
        let body = store.get("bucket", "a/b.csv").await.unwrap();
        let bytes = body.collect().await.unwrap().into_bytes();
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_missing_key() {
        let store = MemoryObjectStore::new();
        let err = store.get("bucket", "missing").await.unwrap_err();
        match err {
            PaletteError::TransferError { target, .. } => {
                assert_eq!(target, "s3://bucket/missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
