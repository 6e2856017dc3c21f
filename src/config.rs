/*!
 * Configuration types for the landing zone router
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, RouterError};

/// Environment variables the CLI reads store names from
pub const ENV_CATALOG_STORE: &str = "DL_CATALOG_DB_NAME";
pub const ENV_AUDIT_STORE: &str = "LZ_LOGENTRY_DB_NAME";
pub const ENV_DATA_LAKE_STORE: &str = "DL_S3_BUCKET_NAME";
pub const ENV_SOURCE_STORE: &str = "LZ_S3_BUCKET_NAME";
pub const ENV_EXCEPTION_STORE: &str = "DL_EXCEPTION_S3_BUCKET_NAME";

/// The five backing stores, by URI (see [`crate::backend`])
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreNames {
    /// Dataset catalog table
    #[serde(default)]
    pub catalog: String,

    /// Audit log table
    #[serde(default)]
    pub audit: String,

    /// Data lake bucket for accepted files
    #[serde(default)]
    pub data_lake: String,

    /// Landing zone bucket files arrive in
    #[serde(default)]
    pub source: String,

    /// Quarantine bucket for unrecognized files
    #[serde(default)]
    pub exception: String,
}

impl StoreNames {
    /// `(setting name, value)` for every store
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("catalog", &self.catalog),
            ("audit", &self.audit),
            ("data_lake", &self.data_lake),
            ("source", &self.source),
            ("exception", &self.exception),
        ]
    }
}

/// S3 client settings shared by every S3 blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Settings {
    /// AWS region (None = SDK default chain)
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL (MinIO, LocalStack)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Path-style addressing
    #[serde(default)]
    pub force_path_style: bool,

    /// Per-operation timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            force_path_style: false,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Main router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Backing store names
    #[serde(default)]
    pub stores: StoreNames,

    /// Maximum events of one batch processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Skip events whose audit record is already committed
    #[serde(default = "default_true")]
    pub skip_processed: bool,

    /// Send files with impossible dates to the exception store
    #[serde(default = "default_true")]
    pub validate_dates: bool,

    /// S3 client settings
    #[serde(default)]
    pub s3: S3Settings,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_seconds() -> u64 {
    60
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            stores: StoreNames::default(),
            concurrency: default_concurrency(),
            skip_processed: true,
            validate_dates: true,
            s3: S3Settings::default(),
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
        }
    }
}

impl RouterConfig {
    /// Build a configuration around the given store names
    pub fn with_stores(stores: StoreNames) -> Self {
        Self {
            stores,
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RouterError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| RouterError::Config(e.to_string()))
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RouterError::Config(e.to_string()))
    }

    /// Check the configuration can drive a router
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = self
            .stores
            .entries()
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(RouterError::Config(format!(
                "missing store names: {}",
                missing.join(", ")
            )));
        }

        if self.concurrency == 0 {
            return Err(RouterError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
