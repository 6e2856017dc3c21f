//! Dataset catalog lookups
//!
//! The catalog is a read-only table keyed by dataset token (`DS_Token`). Each
//! item names the data lake location and partitioning policy of a dataset.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use lz_store_interface::{Item, TableStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RouterError};

/// Catalog key attribute
pub const ATTR_TOKEN: &str = "DS_Token";
/// Partitioning policy attribute
pub const ATTR_PARTITIONING_SCHEME: &str = "Partitioning_Scheme";
/// Data lake prefix attribute
pub const ATTR_DL_LOCATION: &str = "DL_Location";

/// How accepted files are laid out under the dataset prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartitioningScheme {
    /// `Year=YYYY/Month=MM/Day=DD/` under the dataset location
    #[serde(rename = "YMD")]
    Ymd,

    /// Shared `default/` prefix
    #[default]
    #[serde(rename = "DEFAULT")]
    Default,
}

impl PartitioningScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitioningScheme::Ymd => "YMD",
            PartitioningScheme::Default => "DEFAULT",
        }
    }
}

impl fmt::Display for PartitioningScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitioningScheme {
    type Err = std::convert::Infallible;

    /// Anything other than `YMD` falls back to [`PartitioningScheme::Default`]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(if s == "YMD" {
            PartitioningScheme::Ymd
        } else {
            PartitioningScheme::Default
        })
    }
}

/// Routing metadata for one dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub token: String,
    pub dl_location_prefix: String,
    pub partitioning_scheme: PartitioningScheme,
}

impl DatasetRecord {
    pub fn new(
        token: impl Into<String>,
        dl_location_prefix: impl Into<String>,
        partitioning_scheme: PartitioningScheme,
    ) -> Self {
        Self {
            token: token.into(),
            dl_location_prefix: dl_location_prefix.into(),
            partitioning_scheme,
        }
    }

    /// Build a record from catalog attributes
    ///
    /// A missing scheme reads as `DEFAULT` and a missing location as an empty
    /// prefix.
    pub fn from_item(token: &str, item: &Item) -> Self {
        let partitioning_scheme = item
            .get(ATTR_PARTITIONING_SCHEME)
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or_default();

        Self {
            token: token.to_string(),
            dl_location_prefix: item.get(ATTR_DL_LOCATION).cloned().unwrap_or_default(),
            partitioning_scheme,
        }
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(ATTR_TOKEN.to_string(), self.token.clone());
        item.insert(
            ATTR_PARTITIONING_SCHEME.to_string(),
            self.partitioning_scheme.to_string(),
        );
        item.insert(ATTR_DL_LOCATION.to_string(), self.dl_location_prefix.clone());
        item
    }
}

/// Point lookups of dataset records
#[derive(Clone)]
pub struct CatalogResolver {
    table: Arc<dyn TableStore>,
}

impl CatalogResolver {
    pub fn new(table: Arc<dyn TableStore>) -> Self {
        Self { table }
    }

    /// Look up `token`
    ///
    /// `Ok(None)` means the dataset is unknown. Only transport failures of the
    /// underlying table surface as [`RouterError::CatalogUnavailable`].
    pub async fn resolve(&self, token: &str) -> Result<Option<DatasetRecord>> {
        let item = self
            .table
            .get_item(token)
            .await
            .map_err(|source| RouterError::CatalogUnavailable {
                token: token.to_string(),
                source,
            })?;

        debug!(token, table = self.table.table_name(), found = item.is_some(), "Catalog lookup");

        Ok(item.map(|item| DatasetRecord::from_item(token, &item)))
    }

    /// Insert or replace a dataset record
    pub async fn register(&self, record: &DatasetRecord) -> Result<()> {
        self.table
            .put_item(&record.token, record.to_item())
            .await
            .map_err(|source| RouterError::CatalogUnavailable {
                token: record.token.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryTableStore;

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("YMD".parse::<PartitioningScheme>().unwrap(), PartitioningScheme::Ymd);
        assert_eq!("ymd".parse::<PartitioningScheme>().unwrap(), PartitioningScheme::Default);
        assert_eq!("HOURLY".parse::<PartitioningScheme>().unwrap(), PartitioningScheme::Default);
    }

    #[test]
    fn test_record_from_partial_item() {
        let mut item = Item::new();
        item.insert(ATTR_PARTITIONING_SCHEME.to_string(), "YMD".to_string());

        let record = DatasetRecord::from_item("T", &item);
        assert_eq!(record.partitioning_scheme, PartitioningScheme::Ymd);
        assert_eq!(record.dl_location_prefix, "");

        let empty = DatasetRecord::from_item("T", &Item::new());
        assert_eq!(empty.partitioning_scheme, PartitioningScheme::Default);
    }

    #[tokio::test]
    async fn test_resolve_found_and_missing() {
        let table = Arc::new(MemoryTableStore::new("catalog"));
        let resolver = CatalogResolver::new(table.clone());
        resolver
            .register(&DatasetRecord::new("TOKEN123", "lake/", PartitioningScheme::Ymd))
            .await
            .unwrap();

        let found = resolver.resolve("TOKEN123").await.unwrap().unwrap();
        assert_eq!(found.dl_location_prefix, "lake/");
        assert_eq!(found.partitioning_scheme, PartitioningScheme::Ymd);

        assert!(resolver.resolve("UNKNOWN").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_outage_is_not_a_miss() {
        let table = Arc::new(MemoryTableStore::new("catalog"));
        table.fail_reads(true);
        let resolver = CatalogResolver::new(table);

        let err = resolver.resolve("TOKEN123").await.unwrap_err();
        assert!(matches!(
            err,
            RouterError::CatalogUnavailable { ref token, .. } if token == "TOKEN123"
        ));
    }
}
