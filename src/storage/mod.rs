//! Object storage for transformed logo assets
//! Uses Apache Arrow object_store crate

use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, path::Path as StoragePath};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage client wrapping object_store
///
/// Object names are chosen by the caller and deterministic per stock, so
/// re-runs overwrite in place rather than accumulating variants.
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
    url_base: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String, url_base: String) -> Self {
        Self {
            store,
            bucket,
            url_base: url_base.trim_end_matches('/').to_string(),
        }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            bucket: "enrichd-local".to_string(),
            url_base: "memory://enrichd-local".to_string(),
        }
    }

    /// GCS-backed client; credentials come from the environment, which is
    /// how the object_store builder expects them.
    pub fn gcs(bucket: &str) -> Result<Self> {
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()?;

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.to_string(),
            url_base: format!("https://storage.googleapis.com/{}", bucket),
        })
    }

    /// Upload bytes with explicit content type and cache policy. Returns
    /// the public URL of the object.
    pub async fn upload(
        &self,
        object_name: &str,
        data: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> Result<String> {
        let path = StoragePath::from(object_name);
        let size = data.len();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        attributes.insert(Attribute::CacheControl, cache_control.to_string().into());

        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store.put_opts(&path, data.into(), opts).await?;

        tracing::info!(object_name, size, content_type, "Uploaded to storage");

        Ok(format!("{}/{}", self.url_base, object_name))
    }

    /// Download from storage
    pub async fn download(&self, object_name: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(object_name);

        let result = self.store.get(&path).await?;
        let bytes = result.bytes().await?;

        Ok(bytes.to_vec())
    }

    /// Check if an object exists
    pub async fn exists(&self, object_name: &str) -> Result<bool> {
        let path = StoragePath::from(object_name);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_download() {
        let client = StorageClient::in_memory();

        let url = client
            .upload(
                "logos/DMP.png",
                vec![1, 2, 3],
                "image/png",
                "public, max-age=86400",
            )
            .await
            .unwrap();
        assert_eq!(url, "memory://enrichd-local/logos/DMP.png");

        let data = client.download("logos/DMP.png").await.unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_reupload_overwrites() {
        let client = StorageClient::in_memory();

        client
            .upload("logos/DMP.png", vec![1], "image/png", "public")
            .await
            .unwrap();
        client
            .upload("logos/DMP.png", vec![2, 2], "image/png", "public")
            .await
            .unwrap();

        assert_eq!(client.download("logos/DMP.png").await.unwrap(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_exists() {
        let client = StorageClient::in_memory();
        assert!(!client.exists("logos/none.png").await.unwrap());

        client
            .upload("logos/some.png", vec![0], "image/png", "public")
            .await
            .unwrap();
        assert!(client.exists("logos/some.png").await.unwrap());
    }
}
