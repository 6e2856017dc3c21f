//! LZ Store Interface: storage seams for landing zone routing
//!
//! This crate defines the two traits the router talks to, so the routing core
//! never depends on a concrete storage service:
//!
//! 1. **`BlobStore`**: a key/value store of raw object bytes (S3 buckets, a
//!    local directory, memory)
//! 2. **`TableStore`**: a key/item store of string attributes (the dataset
//!    catalog and the audit log)
//!
//! # Example
//!
//! ```rust,no_run
//! use lz_store_interface::{BlobStore, TableStore};
//!
//! async fn copy_if_known<B: BlobStore, T: TableStore>(
//!     catalog: &T,
//!     source: &B,
//!     dest: &B,
//!     token: &str,
//!     key: &str,
//! ) -> lz_store_interface::Result<()> {
//!     if catalog.get_item(token).await?.is_some() {
//!         let data = source.get(key).await?;
//!         dest.put(key, data).await?;
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Key not found in {store}: {key}")]
    NotFound { store: String, key: String },

    #[error("Store {store} unavailable: {message}")]
    Unavailable { store: String, message: String },

    #[error("Invalid record in {store}: {message}")]
    InvalidRecord { store: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Shorthand for a transport/service failure on `store`
    pub fn unavailable(store: impl Into<String>, message: impl ToString) -> Self {
        StoreError::Unavailable {
            store: store.into(),
            message: message.to_string(),
        }
    }

    /// Check if this error means the key does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Check if retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable { .. } => true,
            StoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            StoreError::NotFound { .. } | StoreError::InvalidRecord { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One table row: attribute name to string value
///
/// Attribute names follow the table's own conventions (for example
/// `Partitioning_Scheme` in the catalog), so the map is kept ordered to make
/// serialized items stable.
pub type Item = BTreeMap<String, String>;

/// Object storage with get/put semantics
///
/// Implementations must be `Send + Sync`; one store instance is shared by
/// every event processed concurrently.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the full object stored under `key`
    ///
    /// Returns `StoreError::NotFound` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Write `data` under `key`, replacing any existing object
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Check whether an object exists under `key`
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Name of the bucket, directory or namespace behind this store
    fn store_name(&self) -> &str;
}

/// Point-lookup table with upsert semantics
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Fetch the item stored under `key`
    ///
    /// Absence is `Ok(None)`, never an error.
    async fn get_item(&self, key: &str) -> Result<Option<Item>>;

    /// Insert or replace the item stored under `key`
    async fn put_item(&self, key: &str, item: Item) -> Result<()>;

    /// Return every `(key, item)` pair in the table
    async fn scan(&self) -> Result<Vec<(String, Item)>>;

    /// Name of the table
    fn table_name(&self) -> &str;
}
