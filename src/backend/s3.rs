//! S3 blob store
//!
//! One store per bucket, optionally scoped under a key prefix.

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use lz_store_interface::{BlobStore, Result, StoreError};
use std::time::Duration;

use crate::config::S3Settings;

/// Blob store backed by an S3 (or S3-compatible) bucket
///
/// # Example
///
/// ```no_run
/// use lz_router::backend::S3BlobStore;
/// use lz_router::config::S3Settings;
/// use lz_store_interface::BlobStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let settings = S3Settings {
///         region: Some("us-east-1".to_string()),
///         ..Default::default()
///     };
///     let store = S3BlobStore::connect("landing-zone", None, &settings).await?;
///     let data = store.get("abc_TOKEN123_04052023.csv").await?;
///     println!("Size: {} bytes", data.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct S3BlobStore {
    client: AwsS3Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3BlobStore {
    /// Build a client for `bucket` from the shared S3 settings
    pub async fn connect(
        bucket: impl Into<String>,
        prefix: Option<String>,
        settings: &S3Settings,
    ) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(StoreError::InvalidRecord {
                store: "s3".to_string(),
                message: "bucket name is empty".to_string(),
            });
        }

        let client = build_aws_client(settings).await;
        Ok(Self {
            client,
            bucket,
            prefix: prefix.filter(|p| !p.is_empty()),
        })
    }

    fn object_key(&self, key: &str) -> String {
        object_key_impl(key, self.prefix.as_deref())
    }
}

async fn build_aws_client(settings: &S3Settings) -> AwsS3Client {
    let region_provider = match &settings.region {
        Some(region) => RegionProviderChain::first_try(Region::new(region.clone())),
        None => RegionProviderChain::default_provider(),
    };

    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);

    // Custom endpoint for S3-compatible services (MinIO, LocalStack)
    if let Some(endpoint) = &settings.endpoint {
        builder = builder.endpoint_url(endpoint);
    }
    if settings.force_path_style {
        builder = builder.force_path_style(true);
    }

    let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
        .operation_timeout(Duration::from_secs(settings.timeout_seconds))
        .build();
    builder = builder.timeout_config(timeout_config);

    AwsS3Client::from_conf(builder.build())
}

/// Join an optional prefix and a key (standalone for testing)
fn object_key_impl(key: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
        None => key.to_string(),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, key: &str) -> Result<Bytes> {
        let object_key = self.object_key(key);
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    StoreError::NotFound {
                        store: self.bucket.clone(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::unavailable(&self.bucket, e)
                }
            })?;

        let body = response.body.collect().await.map_err(|e| {
            StoreError::unavailable(&self.bucket, format!("failed to read body: {}", e))
        })?;

        Ok(body.into_bytes())
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StoreError::unavailable(&self.bucket, e))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if missing {
                    Ok(false)
                } else {
                    Err(StoreError::unavailable(&self.bucket, e))
                }
            }
        }
    }

    fn store_name(&self) -> &str {
        &self.bucket
    }
}
