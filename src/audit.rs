/*!
 * Audit logging for routed files
 *
 * Every processed file gets exactly one record in the audit table, keyed by
 * the event's processing id. The record is written `PENDING` once the routing
 * decision is made and rewritten `COMMITTED` after the blob lands, so a crash
 * between the two leaves a pending record that [`AuditRecorder::reconcile`]
 * can settle later. Pending records carry a BLAKE3 hash of the routed bytes;
 * reconciliation only commits when the destination holds exactly those bytes.
 *
 * # Example
 *
 * ```no_run
 * use lz_router::audit::{content_hash, AuditEntry, AuditRecord, AuditRecorder};
 * use lz_router::backend::MemoryTableStore;
 * use lz_router::transfer::BucketRole;
 * use std::sync::Arc;
 *
 * # async fn demo() -> lz_router::Result<()> {
 * let recorder = AuditRecorder::new(Arc::new(MemoryTableStore::new("audit")));
 * let entry = AuditEntry::new("2023-04-05T12:00:00Z", "abc_T_04052023.csv", 42, "N/A");
 * let record = AuditRecord::pending(
 *     "id-1",
 *     entry,
 *     BucketRole::ExceptionDestination,
 *     "abc_T_04052023.csv",
 *     content_hash(b"a,b\n"),
 * );
 * recorder.record(&record).await?;
 * recorder.record(&record.committed()).await?;
 * # Ok(())
 * # }
 * ```
 */

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lz_store_interface::{Item, TableStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, RouterError};
use crate::transfer::{BlobTransfer, BucketRole};

/// Destination path recorded for files that did not go to the data lake
pub const NOT_APPLICABLE: &str = "N/A";

pub const ATTR_TIMESTAMP: &str = "Timestamp";
pub const ATTR_OBJECT_NAME: &str = "LZ_S3_Object_Name";
pub const ATTR_OBJECT_SIZE: &str = "LZ_S3_Object_Size";
pub const ATTR_DESTINATION_PATH: &str = "DL_S3_Object_Path";
pub const ATTR_STATUS: &str = "Status";
pub const ATTR_DESTINATION_ROLE: &str = "Destination_Role";
pub const ATTR_DESTINATION_KEY: &str = "Destination_Key";
pub const ATTR_RECORDED_AT: &str = "Recorded_At";
pub const ATTR_CONTENT_HASH: &str = "Content_Hash";

/// Lowercase hex BLAKE3 digest of an object body
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Outcome of one processed file, as the audit table stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Event time of the arrival
    #[serde(rename = "Timestamp")]
    pub timestamp: String,

    /// Landing zone object key
    #[serde(rename = "LZ_S3_Object_Name")]
    pub source_object_id: String,

    /// Landing zone object size, as a decimal string
    #[serde(rename = "LZ_S3_Object_Size")]
    pub source_object_size: String,

    /// Data lake key, or `N/A` for quarantined files
    #[serde(rename = "DL_S3_Object_Path")]
    pub destination_path: String,
}

impl AuditEntry {
    pub fn new(
        timestamp: impl Into<String>,
        source_object_id: impl Into<String>,
        size_bytes: u64,
        destination_path: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            source_object_id: source_object_id.into(),
            source_object_size: size_bytes.to_string(),
            destination_path: destination_path.into(),
        }
    }

    /// Whether the file went to the data lake
    pub fn is_accepted(&self) -> bool {
        self.destination_path != NOT_APPLICABLE
    }
}

/// Lifecycle of an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    /// Routing decided, blob not yet confirmed at the destination
    Pending,
    /// Blob confirmed at the destination
    Committed,
    /// Reconciliation found no blob at the destination
    Abandoned,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "PENDING",
            AuditStatus::Committed => "COMMITTED",
            AuditStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AuditStatus::Pending),
            "COMMITTED" => Some(AuditStatus::Committed),
            "ABANDONED" => Some(AuditStatus::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit entry plus the bookkeeping needed for write-ahead and reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub processing_id: String,

    #[serde(flatten)]
    pub entry: AuditEntry,

    #[serde(rename = "Status")]
    pub status: AuditStatus,

    #[serde(rename = "Destination_Role")]
    pub destination_role: BucketRole,

    #[serde(rename = "Destination_Key")]
    pub destination_key: String,

    #[serde(rename = "Recorded_At")]
    pub recorded_at: DateTime<Utc>,

    /// BLAKE3 of the bytes being written to the destination
    #[serde(rename = "Content_Hash")]
    pub content_hash: String,
}

impl AuditRecord {
    pub fn pending(
        processing_id: impl Into<String>,
        entry: AuditEntry,
        destination_role: BucketRole,
        destination_key: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            processing_id: processing_id.into(),
            entry,
            status: AuditStatus::Pending,
            destination_role,
            destination_key: destination_key.into(),
            recorded_at: Utc::now(),
            content_hash: content_hash.into(),
        }
    }

    pub fn with_status(mut self, status: AuditStatus) -> Self {
        self.status = status;
        self.recorded_at = Utc::now();
        self
    }

    pub fn committed(&self) -> Self {
        self.clone().with_status(AuditStatus::Committed)
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(ATTR_TIMESTAMP.to_string(), self.entry.timestamp.clone());
        item.insert(ATTR_OBJECT_NAME.to_string(), self.entry.source_object_id.clone());
        item.insert(ATTR_OBJECT_SIZE.to_string(), self.entry.source_object_size.clone());
        item.insert(
            ATTR_DESTINATION_PATH.to_string(),
            self.entry.destination_path.clone(),
        );
        item.insert(ATTR_STATUS.to_string(), self.status.to_string());
        item.insert(
            ATTR_DESTINATION_ROLE.to_string(),
            self.destination_role.to_string(),
        );
        item.insert(ATTR_DESTINATION_KEY.to_string(), self.destination_key.clone());
        item.insert(ATTR_RECORDED_AT.to_string(), self.recorded_at.to_rfc3339());
        item.insert(ATTR_CONTENT_HASH.to_string(), self.content_hash.clone());
        item
    }

    /// Rebuild a record from table attributes; `None` if bookkeeping is unreadable
    pub fn from_item(processing_id: &str, item: &Item) -> Option<Self> {
        let field = |name: &str| item.get(name).cloned().unwrap_or_default();

        let status = AuditStatus::parse(item.get(ATTR_STATUS)?)?;
        let destination_role = BucketRole::parse(item.get(ATTR_DESTINATION_ROLE)?)?;
        let recorded_at = DateTime::parse_from_rfc3339(item.get(ATTR_RECORDED_AT)?)
            .ok()?
            .with_timezone(&Utc);

        Some(Self {
            processing_id: processing_id.to_string(),
            entry: AuditEntry {
                timestamp: field(ATTR_TIMESTAMP),
                source_object_id: field(ATTR_OBJECT_NAME),
                source_object_size: field(ATTR_OBJECT_SIZE),
                destination_path: field(ATTR_DESTINATION_PATH),
            },
            status,
            destination_role,
            destination_key: field(ATTR_DESTINATION_KEY),
            recorded_at,
            content_hash: field(ATTR_CONTENT_HASH),
        })
    }
}

/// Result of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Pending records old enough to be examined
    pub examined: usize,
    /// Records whose destination holds the routed bytes, now committed
    pub committed: usize,
    /// Records whose destination is missing or holds other bytes, now abandoned
    pub abandoned: usize,
    /// Records that could not be settled this pass
    pub errors: usize,
}

/// Writes and reads audit records in the audit table
#[derive(Clone)]
pub struct AuditRecorder {
    table: Arc<dyn TableStore>,
}

impl AuditRecorder {
    pub fn new(table: Arc<dyn TableStore>) -> Self {
        Self { table }
    }

    /// Upsert a record under its processing id
    pub async fn record(&self, record: &AuditRecord) -> Result<()> {
        self.table
            .put_item(&record.processing_id, record.to_item())
            .await
            .map_err(|source| RouterError::AuditWriteFailed {
                object_id: record.entry.source_object_id.clone(),
                source,
            })?;

        debug!(
            processing_id = %record.processing_id,
            status = %record.status,
            destination = %record.entry.destination_path,
            "Audit record written"
        );
        Ok(())
    }

    /// Fetch the record for a processing id, if any
    pub async fn get(&self, processing_id: &str) -> Result<Option<AuditRecord>> {
        let item = self
            .table
            .get_item(processing_id)
            .await
            .map_err(|source| RouterError::AuditUnavailable {
                object_id: processing_id.to_string(),
                source,
            })?;
        Ok(item.and_then(|item| AuditRecord::from_item(processing_id, &item)))
    }

    /// Whether this delivery already completed
    pub async fn is_processed(&self, processing_id: &str) -> Result<bool> {
        Ok(matches!(
            self.get(processing_id).await?,
            Some(AuditRecord {
                status: AuditStatus::Committed,
                ..
            })
        ))
    }

    /// Every readable record in the table
    pub async fn list(&self) -> Result<Vec<AuditRecord>> {
        let rows = self
            .table
            .scan()
            .await
            .map_err(|source| RouterError::AuditUnavailable {
                object_id: self.table.table_name().to_string(),
                source,
            })?;

        Ok(rows
            .iter()
            .filter_map(|(key, item)| {
                let record = AuditRecord::from_item(key, item);
                if record.is_none() {
                    warn!(processing_id = %key, "Skipping unreadable audit record");
                }
                record
            })
            .collect())
    }

    /// Settle pending records recorded before `now - older_than`
    ///
    /// A pending record is committed only when its destination object exists
    /// and hashes to the recorded content hash. A missing object, different
    /// bytes (for example an earlier delivery of the same file name), or a
    /// record without a hash marks it abandoned, so a redelivery is routed
    /// again.
    pub async fn reconcile(
        &self,
        transfer: &BlobTransfer,
        older_than: Duration,
    ) -> Result<ReconcileReport> {
        let cutoff = Utc::now() - older_than;
        let mut report = ReconcileReport::default();

        for record in self.list().await? {
            if record.status != AuditStatus::Pending || record.recorded_at > cutoff {
                continue;
            }
            report.examined += 1;

            let landed = match self.destination_matches(transfer, &record).await {
                Ok(landed) => landed,
                Err(e) => {
                    warn!(
                        processing_id = %record.processing_id,
                        error = %e,
                        "Cannot check destination"
                    );
                    report.errors += 1;
                    continue;
                }
            };

            let status = if landed {
                AuditStatus::Committed
            } else {
                AuditStatus::Abandoned
            };

            match self.record(&record.clone().with_status(status)).await {
                Ok(()) if landed => report.committed += 1,
                Ok(()) => report.abandoned += 1,
                Err(e) => {
                    warn!(
                        processing_id = %record.processing_id,
                        error = %e,
                        "Cannot settle audit record"
                    );
                    report.errors += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            committed = report.committed,
            abandoned = report.abandoned,
            errors = report.errors,
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn destination_matches(
        &self,
        transfer: &BlobTransfer,
        record: &AuditRecord,
    ) -> Result<bool> {
        if record.content_hash.is_empty() {
            return Ok(false);
        }

        let role = record.destination_role;
        let key = record.destination_key.as_str();
        if !transfer.exists(role, key).await? {
            return Ok(false);
        }

        let data = match transfer.fetch(role, key).await {
            Ok(data) => data,
            Err(RouterError::BlobUnavailable { source, .. }) if source.is_not_found() => {
                return Ok(false)
            }
            Err(e) => return Err(e),
        };

        let matches = content_hash(&data) == record.content_hash;
        if !matches {
            debug!(
                processing_id = %record.processing_id,
                key,
                "Destination holds different content"
            );
        }
        Ok(matches)
    }
}
