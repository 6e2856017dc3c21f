/*!
 * Event routing
 *
 * The router takes each arrival through
 * `Received -> Parsed -> Resolved -> {Accepted | Rejected} -> Logged -> Done`:
 * parse the object id, resolve its dataset, pick a destination, copy the
 * bytes, and leave one audit record behind.
 *
 * Parse, catalog and blob failures fail the event. Audit failures are logged
 * and swallowed, so a file that was moved is still reported as processed.
 */

use std::sync::Arc;

use chrono::Duration;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use crate::audit::{
    content_hash, AuditEntry, AuditRecord, AuditRecorder, ReconcileReport, NOT_APPLICABLE,
};
use crate::backend::RouterStores;
use crate::catalog::{CatalogResolver, DatasetRecord, PartitioningScheme};
use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::event::{EventBatch, FileArrivalEvent};
use crate::identifier::{parse_identifier, ParsedIdentifier};
use crate::partition::destination_key;
use crate::transfer::{BlobTransfer, BucketRole};

/// Why a file went to the exception store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Dataset token not in the catalog
    UnknownDataset { token: String },
    /// Date segment cannot form a `Year=/Month=/Day=` partition
    InvalidPartitionDate { raw_date: String, detail: String },
}

/// Where one file goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RoutingDecision {
    Accepted { destination_key: String },
    Rejected(RejectReason),
}

impl RoutingDecision {
    /// Store the file is written to
    pub fn role(&self) -> BucketRole {
        match self {
            RoutingDecision::Accepted { .. } => BucketRole::DataLakeDestination,
            RoutingDecision::Rejected(_) => BucketRole::ExceptionDestination,
        }
    }

    /// Key the file is written under; rejected files keep their source id
    pub fn target_key<'a>(&'a self, source_object_id: &'a str) -> &'a str {
        match self {
            RoutingDecision::Accepted { destination_key } => destination_key,
            RoutingDecision::Rejected(_) => source_object_id,
        }
    }

    /// Value of the audit entry's destination path
    pub fn audit_path(&self) -> &str {
        match self {
            RoutingDecision::Accepted { destination_key } => destination_key,
            RoutingDecision::Rejected(_) => NOT_APPLICABLE,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, RoutingDecision::Accepted { .. })
    }
}

/// Decide the destination of a parsed file
///
/// Pure: the same identifier and catalog record always give the same answer.
/// Dates are only checked for `YMD` datasets, and only when `validate_dates`
/// is set.
pub fn decide(
    parsed: &ParsedIdentifier,
    record: Option<&DatasetRecord>,
    source_object_id: &str,
    validate_dates: bool,
) -> RoutingDecision {
    let Some(record) = record else {
        return RoutingDecision::Rejected(RejectReason::UnknownDataset {
            token: parsed.dataset_token.clone(),
        });
    };

    let date = parsed.date();
    if validate_dates && record.partitioning_scheme == PartitioningScheme::Ymd {
        if let Err(e) = date.validate() {
            return RoutingDecision::Rejected(RejectReason::InvalidPartitionDate {
                raw_date: parsed.raw_date.clone(),
                detail: e.to_string(),
            });
        }
    }

    RoutingDecision::Accepted {
        destination_key: destination_key(record, &date, source_object_id),
    }
}

/// Result of processing one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// File copied and audited
    Routed {
        decision: RoutingDecision,
        entry: AuditEntry,
    },
    /// Already committed under the same processing id; nothing done
    Duplicate { processing_id: String },
}

/// Per-record results of one batch, in delivery order
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<(String, Result<EventOutcome>)>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn duplicates(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(EventOutcome::Duplicate { .. })))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// All outcomes, or `BatchIncomplete` if any record failed
    pub fn into_result(self) -> Result<Vec<EventOutcome>> {
        let failed = self.failed();
        if failed > 0 {
            return Err(RouterError::BatchIncomplete {
                failed,
                total: self.total(),
            });
        }
        self.results.into_iter().map(|(_, r)| r).collect()
    }
}

/// Routes arrivals from the landing zone
#[derive(Clone)]
pub struct Router {
    catalog: CatalogResolver,
    audit: AuditRecorder,
    transfer: BlobTransfer,
    concurrency: usize,
    skip_processed: bool,
    validate_dates: bool,
}

impl Router {
    pub fn new(config: &RouterConfig, stores: RouterStores) -> Self {
        Self {
            catalog: CatalogResolver::new(Arc::clone(&stores.catalog)),
            audit: AuditRecorder::new(Arc::clone(&stores.audit)),
            transfer: BlobTransfer::new(stores.source, stores.data_lake, stores.exception),
            concurrency: config.concurrency.max(1),
            skip_processed: config.skip_processed,
            validate_dates: config.validate_dates,
        }
    }

    pub fn catalog(&self) -> &CatalogResolver {
        &self.catalog
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub fn transfer(&self) -> &BlobTransfer {
        &self.transfer
    }

    /// Route one arrival
    pub async fn process_event(&self, event: &FileArrivalEvent) -> Result<EventOutcome> {
        let processing_id = event.processing_id();
        let span = info_span!(
            "route_event",
            object = %event.source_object_id,
            id = %&processing_id[..12],
        );

        self.route(event, processing_id).instrument(span).await
    }

    async fn route(
        &self,
        event: &FileArrivalEvent,
        processing_id: String,
    ) -> Result<EventOutcome> {
        let source_id = event.source_object_id.as_str();
        let parsed = parse_identifier(source_id)?;

        if self.skip_processed {
            match self.audit.is_processed(&processing_id).await {
                Ok(true) => {
                    info!("Already processed, skipping");
                    return Ok(EventOutcome::Duplicate { processing_id });
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Cannot read processed marker, routing anyway"),
            }
        }

        let record = self.catalog.resolve(&parsed.dataset_token).await?;
        let decision = decide(&parsed, record.as_ref(), source_id, self.validate_dates);
        let role = decision.role();
        let target = decision.target_key(source_id);

        if let RoutingDecision::Rejected(reason) = &decision {
            warn!(?reason, "Sending file to exception store");
        }

        let entry = AuditEntry::new(
            event.event_timestamp.clone(),
            source_id,
            event.size_bytes,
            decision.audit_path(),
        );

        let data = self.transfer.fetch(BucketRole::Source, source_id).await?;

        let pending = AuditRecord::pending(
            processing_id.as_str(),
            entry.clone(),
            role,
            target,
            content_hash(&data),
        );
        if let Err(e) = self.audit.record(&pending).await {
            warn!(error = %e, "Pending audit record not written");
        }

        self.transfer.store(role, target, data).await?;

        if let Err(e) = self.audit.record(&pending.committed()).await {
            warn!(error = %e, "Committed audit record not written");
        }

        info!(%role, destination = target, "File routed");
        Ok(EventOutcome::Routed { decision, entry })
    }

    /// Route every S3 record of a batch, at most `concurrency` at a time
    pub async fn process_batch(&self, batch: &EventBatch) -> BatchOutcome {
        let arrivals = batch.arrivals();
        if arrivals.is_empty() {
            info!("No S3 records in batch");
            return BatchOutcome::default();
        }

        let results: Vec<(String, Result<EventOutcome>)> = stream::iter(arrivals)
            .map(|event| async move {
                let result = self.process_event(&event).await;
                if let Err(e) = &result {
                    error!(
                        object = %event.source_object_id,
                        category = %e.category(),
                        error = %e,
                        "Event failed"
                    );
                }
                (event.source_object_id, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let outcome = BatchOutcome { results };
        info!(
            total = outcome.total(),
            failed = outcome.failed(),
            duplicates = outcome.duplicates(),
            "Batch finished"
        );
        outcome
    }

    /// Settle pending audit records older than `older_than`
    pub async fn reconcile(&self, older_than: Duration) -> Result<ReconcileReport> {
        self.audit.reconcile(&self.transfer, older_than).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditStatus;
    use crate::backend::{MemoryBlobStore, MemoryTableStore};
    use crate::catalog::PartitioningScheme;

    struct Fixture {
        router: Router,
        catalog: MemoryTableStore,
        audit: MemoryTableStore,
        source: MemoryBlobStore,
        lake: MemoryBlobStore,
        exception: MemoryBlobStore,
    }

    fn fixture(config: RouterConfig) -> Fixture {
        crate::logging::init_test_logging();

        let catalog = MemoryTableStore::new("catalog");
        let audit = MemoryTableStore::new("audit");
        let source = MemoryBlobStore::new("lz");
        let lake = MemoryBlobStore::new("dl");
        let exception = MemoryBlobStore::new("ex");

        let stores = RouterStores {
            catalog: Arc::new(catalog.clone()),
            audit: Arc::new(audit.clone()),
            source: Arc::new(source.clone()),
            data_lake: Arc::new(lake.clone()),
            exception: Arc::new(exception.clone()),
        };

        Fixture {
            router: Router::new(&config, stores),
            catalog,
            audit,
            source,
            lake,
            exception,
        }
    }

    fn parsed(token: &str, raw_date: &str) -> ParsedIdentifier {
        ParsedIdentifier {
            dataset_token: token.to_string(),
            raw_date: raw_date.to_string(),
        }
    }

    #[test]
    fn test_decide_unknown_dataset() {
        let decision = decide(&parsed("T", "04052023"), None, "a_T_04052023.csv", true);
        assert_eq!(decision.role(), BucketRole::ExceptionDestination);
        assert_eq!(decision.audit_path(), "N/A");
        assert_eq!(decision.target_key("a_T_04052023.csv"), "a_T_04052023.csv");
    }

    #[test]
    fn test_decide_ymd_accepted() {
        let record = DatasetRecord::new("T", "lake/", PartitioningScheme::Ymd);
        let decision = decide(&parsed("T", "04052023"), Some(&record), "a_T_04052023.csv", true);
        assert_eq!(
            decision,
            RoutingDecision::Accepted {
                destination_key: "lake/Year=2023/Month=04/Day=05/a_T_04052023.csv".to_string()
            }
        );
    }

    #[test]
    fn test_decide_bad_date_depends_on_flag_and_scheme() {
        let ymd = DatasetRecord::new("T", "lake/", PartitioningScheme::Ymd);
        let default = DatasetRecord::new("T", "lake/", PartitioningScheme::Default);
        let id = parsed("T", "13452023");

        assert!(matches!(
            decide(&id, Some(&ymd), "a_T_13452023", true),
            RoutingDecision::Rejected(RejectReason::InvalidPartitionDate { .. })
        ));
        assert_eq!(
            decide(&id, Some(&ymd), "a_T_13452023", false).audit_path(),
            "lake/Year=2023/Month=13/Day=45/a_T_13452023"
        );
        assert_eq!(
            decide(&id, Some(&default), "a_T_13452023", true).audit_path(),
            "default/a_T_13452023"
        );
    }

    #[tokio::test]
    async fn test_accepted_file_is_copied_and_committed() {
        let f = fixture(RouterConfig::default());
        f.catalog.insert("TOKEN123", &[("Partitioning_Scheme", "YMD"), ("DL_Location", "lake/")]);
        f.source.insert("abc_TOKEN123_04052023.csv", b"a,b\n1,2\n");

        let event = FileArrivalEvent::new("abc_TOKEN123_04052023.csv", 8, "2023-04-05T12:00:00Z");
        let outcome = f.router.process_event(&event).await.unwrap();

        let key = "lake/Year=2023/Month=04/Day=05/abc_TOKEN123_04052023.csv";
        match outcome {
            EventOutcome::Routed { decision, entry } => {
                assert!(decision.is_accepted());
                assert_eq!(entry.destination_path, key);
                assert_eq!(entry.source_object_size, "8");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(f.lake.object(key).unwrap().as_ref(), b"a,b\n1,2\n");
        assert!(f.exception.is_empty());

        let record = f.router.audit().get(&event.processing_id()).await.unwrap().unwrap();
        assert_eq!(record.status, AuditStatus::Committed);
        assert_eq!(f.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_id_fails_without_audit() {
        let f = fixture(RouterConfig::default());
        f.source.insert("nounderscores.csv", b"x");

        let err = f
            .router
            .process_event(&FileArrivalEvent::new("nounderscores.csv", 1, "t"))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::MalformedIdentifier { segments: 1, .. }));
        assert!(f.audit.is_empty());
        assert!(f.exception.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_outage_fails_event() {
        let f = fixture(RouterConfig::default());
        f.catalog.fail_reads(true);
        f.source.insert("a_T_04052023.csv", b"x");

        let err = f
            .router
            .process_event(&FileArrivalEvent::new("a_T_04052023.csv", 1, "t"))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::CatalogUnavailable { .. }));
        assert!(f.exception.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_fails_before_audit() {
        let f = fixture(RouterConfig::default());
        let event = FileArrivalEvent::new("a_T_04052023.csv", 1, "t");

        let err = f.router.process_event(&event).await.unwrap_err();
        assert!(matches!(
            err,
            RouterError::BlobUnavailable { role: BucketRole::Source, .. }
        ));
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn test_failed_store_leaves_pending_record_with_hash() {
        let f = fixture(RouterConfig::default());
        f.source.insert("a_T_04052023.csv", b"body");
        f.exception.fail_puts(true);
        let event = FileArrivalEvent::new("a_T_04052023.csv", 4, "t");

        let err = f.router.process_event(&event).await.unwrap_err();
        assert!(matches!(
            err,
            RouterError::BlobUnavailable { role: BucketRole::ExceptionDestination, .. }
        ));

        let record = f.router.audit().get(&event.processing_id()).await.unwrap().unwrap();
        assert_eq!(record.status, AuditStatus::Pending);
        assert_eq!(record.content_hash, crate::audit::content_hash(b"body"));
    }

    #[tokio::test]
    async fn test_audit_failure_is_swallowed() {
        let f = fixture(RouterConfig::default());
        f.audit.fail_writes(true);
        f.source.insert("a_T_04052023.csv", b"x");

        let outcome = f
            .router
            .process_event(&FileArrivalEvent::new("a_T_04052023.csv", 1, "t"))
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Routed { .. }));
        assert!(f.exception.object("a_T_04052023.csv").is_some());
    }

    #[tokio::test]
    async fn test_redelivery_is_skipped() {
        let f = fixture(RouterConfig::default());
        f.source.insert("a_T_04052023.csv", b"x");
        let event = FileArrivalEvent::new("a_T_04052023.csv", 1, "t");

        f.router.process_event(&event).await.unwrap();
        let again = f.router.process_event(&event).await.unwrap();

        assert!(matches!(again, EventOutcome::Duplicate { .. }));
        assert_eq!(f.exception.put_count(), 1);
        assert_eq!(f.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_reprocessed_when_skip_disabled() {
        let config = RouterConfig {
            skip_processed: false,
            ..Default::default()
        };
        let f = fixture(config);
        f.source.insert("a_T_04052023.csv", b"x");
        let event = FileArrivalEvent::new("a_T_04052023.csv", 1, "t");

        let first = f.router.process_event(&event).await.unwrap();
        let second = f.router.process_event(&event).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.exception.put_count(), 2);
        assert_eq!(f.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_processes_every_record() {
        let f = fixture(RouterConfig {
            concurrency: 2,
            ..Default::default()
        });
        f.catalog.insert("T", &[("Partitioning_Scheme", "DEFAULT")]);
        for name in ["a_T_01012023.csv", "b_T_01022023.csv", "c_X_01032023.csv"] {
            f.source.insert(name, name.as_bytes());
        }

        let batch = EventBatch::from_events([
            FileArrivalEvent::new("a_T_01012023.csv", 16, "t1"),
            FileArrivalEvent::new("missing_T_01012023.csv", 1, "t2"),
            FileArrivalEvent::new("b_T_01022023.csv", 16, "t3"),
            FileArrivalEvent::new("c_X_01032023.csv", 16, "t4"),
        ]);

        let outcome = f.router.process_batch(&batch).await;
        assert_eq!(outcome.total(), 4);
        assert_eq!(outcome.failed(), 1);

        let order: Vec<&str> = outcome.results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(
            order,
            ["a_T_01012023.csv", "missing_T_01012023.csv", "b_T_01022023.csv", "c_X_01032023.csv"]
        );

        assert!(f.lake.object("default/a_T_01012023.csv").is_some());
        assert!(f.lake.object("default/b_T_01022023.csv").is_some());
        assert!(f.exception.object("c_X_01032023.csv").is_some());

        assert!(matches!(
            outcome.into_result(),
            Err(RouterError::BatchIncomplete { failed: 1, total: 4 })
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_is_success() {
        let f = fixture(RouterConfig::default());
        let outcome = f.router.process_batch(&EventBatch::default()).await;
        assert_eq!(outcome.total(), 0);
        assert!(outcome.into_result().unwrap().is_empty());
    }
}
