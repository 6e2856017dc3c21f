//! Blob transfer between the landing zone and its destinations

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use lz_store_interface::BlobStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RouterError};

/// Which of the three blob stores an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketRole {
    /// Landing zone intake
    Source,
    /// Partitioned data lake
    DataLakeDestination,
    /// Quarantine for unrecognized files
    ExceptionDestination,
}

impl BucketRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketRole::Source => "source",
            BucketRole::DataLakeDestination => "data_lake",
            BucketRole::ExceptionDestination => "exception",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "source" => Some(BucketRole::Source),
            "data_lake" => Some(BucketRole::DataLakeDestination),
            "exception" => Some(BucketRole::ExceptionDestination),
            _ => None,
        }
    }
}

impl fmt::Display for BucketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetch/store over the source, data lake and exception stores
#[derive(Clone)]
pub struct BlobTransfer {
    source: Arc<dyn BlobStore>,
    data_lake: Arc<dyn BlobStore>,
    exception: Arc<dyn BlobStore>,
}

impl BlobTransfer {
    pub fn new(
        source: Arc<dyn BlobStore>,
        data_lake: Arc<dyn BlobStore>,
        exception: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            source,
            data_lake,
            exception,
        }
    }

    fn store_for(&self, role: BucketRole) -> &Arc<dyn BlobStore> {
        match role {
            BucketRole::Source => &self.source,
            BucketRole::DataLakeDestination => &self.data_lake,
            BucketRole::ExceptionDestination => &self.exception,
        }
    }

    /// Read an object; missing keys and transport errors are both `BlobUnavailable`
    pub async fn fetch(&self, role: BucketRole, key: &str) -> Result<Bytes> {
        let store = self.store_for(role);
        let data = store
            .get(key)
            .await
            .map_err(|source| RouterError::BlobUnavailable {
                role,
                key: key.to_string(),
                source,
            })?;

        debug!(%role, store = store.store_name(), key, bytes = data.len(), "Fetched object");
        Ok(data)
    }

    /// Write an object, overwriting whatever is at `key`
    pub async fn store(&self, role: BucketRole, key: &str, data: Bytes) -> Result<()> {
        let store = self.store_for(role);
        let len = data.len();
        store
            .put(key, data)
            .await
            .map_err(|source| RouterError::BlobUnavailable {
                role,
                key: key.to_string(),
                source,
            })?;

        debug!(%role, store = store.store_name(), key, bytes = len, "Stored object");
        Ok(())
    }

    /// Check whether `key` exists in the store for `role`
    pub async fn exists(&self, role: BucketRole, key: &str) -> Result<bool> {
        self.store_for(role)
            .exists(key)
            .await
            .map_err(|source| RouterError::BlobUnavailable {
                role,
                key: key.to_string(),
                source,
            })
    }
}
