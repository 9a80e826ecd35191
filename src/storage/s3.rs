// src/storage/s3.rs
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::{
    path::Path as ObjectPath, Attribute, Attributes, ObjectStore, PutOptions, PutPayload,
};
use std::sync::Arc;

use super::BackupStore;

/// Backup store on an S3 (or S3-compatible) bucket.
#[derive(Debug)]
pub struct S3Storage {
    bucket: String,
    store: Arc<dyn ObjectStore>,
}

impl S3Storage {
    /// Credentials and region come from the standard `AWS_*` environment variables.
    pub fn new(bucket: &str) -> Result<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()?;

        Ok(Self::with_store(bucket, Arc::new(store)))
    }

    /// Create S3Storage with custom endpoint for MinIO/S3-compatible storage
    pub fn new_with_config(
        bucket: &str,
        region: Option<&str>,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        allow_http: bool,
    ) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_endpoint(endpoint)
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key)
            .with_allow_http(allow_http)
            // MinIO and most S3-compatible stores need path-style URLs
            .with_virtual_hosted_style_request(false);

        if let Some(region) = region {
            builder = builder.with_region(region);
        }

        Ok(Self::with_store(bucket, Arc::new(builder.build()?)))
    }

    /// Wrap an existing object store, e.g. `object_store::memory::InMemory` in tests.
    pub fn with_store(bucket: &str, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: bucket.to_string(),
            store,
        }
    }
}

#[async_trait]
impl BackupStore for S3Storage {
    fn object_url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&ObjectPath::from(key), PutPayload::from(data), options)
            .await?;
        Ok(self.object_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory() -> (S3Storage, Arc<object_store::memory::InMemory>) {
        let store = Arc::new(object_store::memory::InMemory::new());
        (S3Storage::with_store("raw-datasets", store.clone()), store)
    }

    #[test]
    fn test_object_url_format() {
        let (storage, _) = in_memory();
        assert_eq!(
            storage.object_url("uploads/raw_airports/1_airports.csv"),
            "s3://raw-datasets/uploads/raw_airports/1_airports.csv"
        );
    }

    #[tokio::test]
    async fn test_put_writes_object_at_key() {
        let (storage, store) = in_memory();

        let url = storage
            .put(
                "uploads/raw_sales/1_sales.csv",
                Bytes::from_static(b"a,b\n1,2\n"),
                "text/csv",
            )
            .await
            .unwrap();

        assert_eq!(url, "s3://raw-datasets/uploads/raw_sales/1_sales.csv");

        let object = store
            .get(&ObjectPath::from("uploads/raw_sales/1_sales.csv"))
            .await
            .unwrap();
        assert_eq!(
            object
                .attributes
                .get(&Attribute::ContentType)
                .map(|v| v.to_string()),
            Some("text/csv".to_string())
        );
        assert_eq!(object.bytes().await.unwrap().as_ref(), b"a,b\n1,2\n");
    }
}
