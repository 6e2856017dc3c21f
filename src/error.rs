/*!
 * Error types for the landing zone router
 */

use std::fmt;
use std::io;

use lz_store_interface::StoreError;
use thiserror::Error;

use crate::transfer::BucketRole;

pub type Result<T> = std::result::Result<T, RouterError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Error, Debug)]
pub enum RouterError {
    /// Object id does not carry `prefix_TOKEN_MMDDYYYY` segments
    #[error(
        "Malformed object identifier '{object_id}': \
         expected at least 3 '_'-separated segments, found {segments}"
    )]
    MalformedIdentifier { object_id: String, segments: usize },

    /// Catalog lookup failed in transport (absence is not an error)
    #[error("Catalog unavailable while resolving token '{token}': {source}")]
    CatalogUnavailable {
        token: String,
        #[source]
        source: StoreError,
    },

    /// Blob fetch or store failed
    #[error("Blob unavailable in {role} store for key '{key}': {source}")]
    BlobUnavailable {
        role: BucketRole,
        key: String,
        #[source]
        source: StoreError,
    },

    /// Audit store write failed
    #[error("Audit write failed for '{object_id}': {source}")]
    AuditWriteFailed {
        object_id: String,
        #[source]
        source: StoreError,
    },

    /// Audit store read failed
    #[error("Audit store unavailable while reading '{object_id}': {source}")]
    AuditUnavailable {
        object_id: String,
        #[source]
        source: StoreError,
    },

    /// Invocation payload could not be understood
    #[error("Invalid event payload: {0}")]
    InvalidEvent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Some events of a batch failed
    #[error("{failed} of {total} events failed")]
    BatchIncomplete { failed: usize, total: usize },
}

impl RouterError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RouterError::Config(_) | RouterError::InvalidEvent(_) => EXIT_FATAL,
            _ => EXIT_PARTIAL,
        }
    }

    /// Check if this error is fatal (redelivering the event cannot help)
    pub fn is_fatal(&self) -> bool {
        match self {
            RouterError::MalformedIdentifier { .. } => true,
            RouterError::InvalidEvent(_) => true,
            RouterError::Config(_) => true,

            RouterError::CatalogUnavailable { .. } => false,
            RouterError::BlobUnavailable { .. } => false,
            RouterError::AuditWriteFailed { .. } => false,
            RouterError::AuditUnavailable { .. } => false,
            RouterError::Io(_) => false,
            RouterError::BatchIncomplete { .. } => false,
        }
    }

    /// Check if this error is transient (temporary, worth a redelivery)
    pub fn is_transient(&self) -> bool {
        match self {
            RouterError::CatalogUnavailable { source, .. }
            | RouterError::BlobUnavailable { source, .. }
            | RouterError::AuditWriteFailed { source, .. }
            | RouterError::AuditUnavailable { source, .. } => source.is_transient(),
            RouterError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            RouterError::MalformedIdentifier { .. } | RouterError::InvalidEvent(_) => {
                ErrorCategory::Validation
            }
            RouterError::CatalogUnavailable { .. } => ErrorCategory::Catalog,
            RouterError::BlobUnavailable { .. } => ErrorCategory::Storage,
            RouterError::AuditWriteFailed { .. } | RouterError::AuditUnavailable { .. } => {
                ErrorCategory::Audit
            }
            RouterError::Config(_) => ErrorCategory::Configuration,
            RouterError::Io(_) => ErrorCategory::IoError,
            RouterError::BatchIncomplete { .. } => ErrorCategory::Batch,
        }
    }
}

/// Error category for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Catalog,
    Storage,
    Audit,
    Configuration,
    IoError,
    Batch,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Catalog => "catalog",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Audit => "audit",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::IoError => "io",
            ErrorCategory::Batch => "batch",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
