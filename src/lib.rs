/*!
 * lz-router - landing zone file router
 *
 * Moves files that land in an intake store into a partitioned data lake:
 * - Dataset token and date parsed from the object name
 * - Dataset lookup in a catalog table
 * - `Year=/Month=/Day=` partitioning for YMD datasets, `default/` otherwise
 * - Unknown datasets quarantined in an exception store
 * - Write-ahead audit log keyed by a stable processing id
 */

pub mod audit;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod identifier;
pub mod logging;
pub mod partition;
pub mod router;
pub mod transfer;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditRecorder, AuditStatus, ReconcileReport};
pub use catalog::{CatalogResolver, DatasetRecord, PartitioningScheme};
pub use config::{RouterConfig, StoreNames};
pub use error::{Result, RouterError};
pub use event::{EventBatch, FileArrivalEvent};
pub use router::{BatchOutcome, EventOutcome, RejectReason, Router, RoutingDecision};
pub use transfer::{BlobTransfer, BucketRole};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
