//! File arrival events
//!
//! The invoker pushes S3 object-created notifications. Only the fields the
//! router needs are decoded; everything else in the payload is ignored.
//! Records from other sources may share the envelope and need not carry an
//! `s3` block.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, RouterError};

/// Event source tag carried by S3 notifications
pub const S3_EVENT_SOURCE: &str = "aws:s3";

/// One file that landed in the intake store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArrivalEvent {
    /// Key of the object in the source store
    pub source_object_id: String,

    /// Object size in bytes
    pub size_bytes: u64,

    /// ISO-8601 time the object arrived
    pub event_timestamp: String,
}

impl FileArrivalEvent {
    pub fn new(
        source_object_id: impl Into<String>,
        size_bytes: u64,
        event_timestamp: impl Into<String>,
    ) -> Self {
        Self {
            source_object_id: source_object_id.into(),
            size_bytes,
            event_timestamp: event_timestamp.into(),
        }
    }

    /// Stable identifier for this delivery
    ///
    /// Redelivery of the same notification yields the same id, which is what
    /// the audit log is keyed by.
    pub fn processing_id(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.source_object_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.size_bytes.to_string().as_bytes());
        hasher.update(&[0]);
        hasher.update(self.event_timestamp.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// S3 notification envelope: `{"Records": [...]}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default)]
    pub event_source: String,

    #[serde(default)]
    pub event_time: String,

    #[serde(default)]
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    #[serde(default)]
    pub object: Option<S3Object>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    pub key: String,

    #[serde(default)]
    pub size: u64,
}

impl EventRecord {
    pub fn is_s3(&self) -> bool {
        self.event_source == S3_EVENT_SOURCE
    }

    /// Arrival event for an S3 record; `None` if the object block is missing
    pub fn to_arrival(&self) -> Option<FileArrivalEvent> {
        let object = self.s3.as_ref()?.object.as_ref()?;
        Some(FileArrivalEvent::new(
            object.key.clone(),
            object.size,
            self.event_time.clone(),
        ))
    }
}

impl EventBatch {
    /// Decode a notification payload
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| RouterError::InvalidEvent(e.to_string()))
    }

    /// Build a batch of S3 records from already-decoded events
    pub fn from_events(events: impl IntoIterator<Item = FileArrivalEvent>) -> Self {
        let records = events
            .into_iter()
            .map(|e| EventRecord {
                event_source: S3_EVENT_SOURCE.to_string(),
                event_time: e.event_timestamp,
                s3: Some(S3Entity {
                    object: Some(S3Object {
                        key: e.source_object_id,
                        size: e.size_bytes,
                    }),
                }),
            })
            .collect();
        Self { records }
    }

    /// Arrival events for every S3 record, in delivery order
    pub fn arrivals(&self) -> Vec<FileArrivalEvent> {
        self.records
            .iter()
            .filter(|r| r.is_s3())
            .filter_map(|r| {
                let arrival = r.to_arrival();
                if arrival.is_none() {
                    warn!(event_time = %r.event_time, "S3 record without an object, skipping");
                }
                arrival
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
