//! Concrete stores behind the router
//!
//! Store names in [`StoreNames`](crate::config::StoreNames) are URIs. This
//! module parses them and opens the matching [`BlobStore`] / [`TableStore`]
//! implementation.
//!
//! # Blob store URIs
//!
//! - `s3://bucket[/prefix]`: S3 bucket (requires the `s3-native` feature)
//! - `file:///path/to/dir`, or any value containing `/`: local directory
//! - `memory://name`: process-local, empty on open
//! - a bare name such as `landing-zone`: S3 bucket
//!
//! # Table store URIs
//!
//! - `sqlite://path/to/db[?table=name]`, or a bare path: SQLite (requires the
//!   `sqlite` feature, on by default)
//! - `memory://name`: process-local, empty on open

mod local;
mod memory;

#[cfg(feature = "s3-native")]
mod s3;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use local::LocalBlobStore;
pub use memory::{MemoryBlobStore, MemoryTableStore};

#[cfg(feature = "s3-native")]
pub use s3::S3BlobStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTableStore;

use lz_store_interface::{BlobStore, TableStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::config::{RouterConfig, S3Settings};
use crate::error::{Result, RouterError};

/// Table name used for the catalog when the URI does not name one
pub const DEFAULT_CATALOG_TABLE: &str = "dataset_catalog";
/// Table name used for the audit log when the URI does not name one
pub const DEFAULT_AUDIT_TABLE: &str = "landing_zone_log";

/// Where a blob store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobLocation {
    Memory(String),
    Local(PathBuf),
    S3 {
        bucket: String,
        prefix: Option<String>,
    },
}

/// Where a table store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLocation {
    Memory(String),
    Sqlite { path: String, table: Option<String> },
}

/// Parse a blob store URI
///
/// ```
/// use lz_router::backend::{parse_blob_uri, BlobLocation};
///
/// assert_eq!(
///     parse_blob_uri("s3://dl-bucket/raw").unwrap(),
///     BlobLocation::S3 { bucket: "dl-bucket".into(), prefix: Some("raw".into()) }
/// );
/// assert!(matches!(parse_blob_uri("./lz").unwrap(), BlobLocation::Local(_)));
/// ```
pub fn parse_blob_uri(uri: &str) -> Result<BlobLocation> {
    if uri.is_empty() {
        return Err(RouterError::Config("empty blob store name".to_string()));
    }

    // Bare names are buckets, anything path-like is a local directory
    if !uri.contains("://") {
        if uri.contains('/') || uri.contains('\\') || uri.starts_with('.') {
            return Ok(BlobLocation::Local(PathBuf::from(uri)));
        }
        return Ok(BlobLocation::S3 {
            bucket: uri.to_string(),
            prefix: None,
        });
    }

    let url = parse_url(uri)?;

    match url.scheme() {
        "memory" => Ok(BlobLocation::Memory(host_of(&url).to_string())),
        "s3" => {
            let bucket = host_of(&url);
            if bucket.is_empty() {
                return Err(RouterError::Config(format!("missing bucket in '{}'", uri)));
            }
            let prefix = url.path().trim_matches('/');
            Ok(BlobLocation::S3 {
                bucket: bucket.to_string(),
                prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            })
        }
        "file" => url
            .to_file_path()
            .map(BlobLocation::Local)
            .map_err(|_| RouterError::Config(format!("not a local path: '{}'", uri))),
        scheme => Err(RouterError::Config(format!(
            "unsupported blob store scheme '{}' in '{}'",
            scheme, uri
        ))),
    }
}

/// Parse a table store URI
///
/// The SQLite table name comes from the `table` query parameter; other
/// parameters are ignored.
pub fn parse_table_uri(uri: &str) -> Result<TableLocation> {
    if uri.is_empty() {
        return Err(RouterError::Config("empty table store name".to_string()));
    }

    if !uri.contains("://") {
        return Ok(TableLocation::Sqlite {
            path: uri.to_string(),
            table: None,
        });
    }

    let url = parse_url(uri)?;

    match url.scheme() {
        "memory" => Ok(TableLocation::Memory(host_of(&url).to_string())),
        "sqlite" => {
            // `sqlite://data/router.db` puts the first segment in the host slot
            let path = format!("{}{}", host_of(&url), url.path());
            if path.is_empty() {
                return Err(RouterError::Config(format!(
                    "missing database path in '{}'",
                    uri
                )));
            }

            let table = url
                .query_pairs()
                .find(|(k, _)| k == "table")
                .map(|(_, v)| v.into_owned())
                .filter(|t| !t.is_empty());

            Ok(TableLocation::Sqlite { path, table })
        }
        scheme => Err(RouterError::Config(format!(
            "unsupported table store scheme '{}' in '{}'",
            scheme, uri
        ))),
    }
}

fn parse_url(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|e| RouterError::Config(format!("Invalid URI '{}': {}", uri, e)))
}

fn host_of(url: &Url) -> &str {
    url.host_str().unwrap_or_default()
}

/// Open the blob store at `uri`
pub async fn open_blob_store(uri: &str, s3: &S3Settings) -> Result<Arc<dyn BlobStore>> {
    let location = parse_blob_uri(uri)?;
    debug!(uri, ?location, "Opening blob store");

    match location {
        BlobLocation::Memory(name) => Ok(Arc::new(MemoryBlobStore::new(name))),
        BlobLocation::Local(root) => Ok(Arc::new(LocalBlobStore::new(root))),
        #[cfg(feature = "s3-native")]
        BlobLocation::S3 { bucket, prefix } => {
            let store = S3BlobStore::connect(bucket, prefix, s3)
                .await
                .map_err(|e| RouterError::Config(e.to_string()))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "s3-native"))]
        BlobLocation::S3 { bucket, .. } => {
            let _ = s3;
            Err(RouterError::Config(format!(
                "S3 bucket '{}' requires the s3-native feature",
                bucket
            )))
        }
    }
}

/// Open the table store at `uri`, using `default_table` when the URI names none
pub async fn open_table_store(uri: &str, default_table: &str) -> Result<Arc<dyn TableStore>> {
    let location = parse_table_uri(uri)?;
    debug!(uri, ?location, "Opening table store");

    match location {
        TableLocation::Memory(name) => Ok(Arc::new(MemoryTableStore::new(name))),
        #[cfg(feature = "sqlite")]
        TableLocation::Sqlite { path, table } => {
            let table = table.as_deref().unwrap_or(default_table);
            let store = SqliteTableStore::open(&path, table)
                .await
                .map_err(|e| RouterError::Config(e.to_string()))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        TableLocation::Sqlite { path, .. } => {
            let _ = default_table;
            Err(RouterError::Config(format!(
                "SQLite table '{}' requires the sqlite feature",
                path
            )))
        }
    }
}

/// The five stores a router works against
#[derive(Clone)]
pub struct RouterStores {
    pub catalog: Arc<dyn TableStore>,
    pub audit: Arc<dyn TableStore>,
    pub source: Arc<dyn BlobStore>,
    pub data_lake: Arc<dyn BlobStore>,
    pub exception: Arc<dyn BlobStore>,
}

impl RouterStores {
    /// Open every store named in the configuration
    pub async fn open(config: &RouterConfig) -> Result<Self> {
        let names = &config.stores;
        Ok(Self {
            catalog: open_table_store(&names.catalog, DEFAULT_CATALOG_TABLE).await?,
            audit: open_table_store(&names.audit, DEFAULT_AUDIT_TABLE).await?,
            source: open_blob_store(&names.source, &config.s3).await?,
            data_lake: open_blob_store(&names.data_lake, &config.s3).await?,
            exception: open_blob_store(&names.exception, &config.s3).await?,
        })
    }
}
