use serde::Deserialize;

use crate::Config;
use crate::shared::{FilesConfig, PgConnectionConfig, SchemaConfig, ValidationError};

/// Configuration for an export run.
///
/// This intentionally does not implement `Serialize` to avoid leaking the connection password.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Connection to the source database.
    pub connection: PgConnectionConfig,
    /// Output locations for the data and mapping documents.
    #[serde(default)]
    pub files: FilesConfig,
    /// Number of concurrent build workers.
    #[serde(default = "default_workers")]
    pub workers: u16,
    /// Maximum number of open connections to the source database.
    #[serde(default = "default_connections")]
    pub connections: u32,
    /// Maximum number of attempts to build one root record before the run is aborted.
    #[serde(
        rename = "maxRetries",
        alias = "maxretries",
        alias = "max_retries",
        default = "default_max_retries"
    )]
    pub max_retries: u32,
    /// Milliseconds to wait between two build attempts of the same record.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Upper bound, in milliseconds, of the random delay applied before each build.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    /// Name of the target index written in every bulk action header.
    pub index: String,
    /// Document type written in every bulk action header and in the mapping.
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Root of the query tree.
    pub schema: SchemaConfig,
}

impl ExportConfig {
    /// Default number of build workers.
    pub const DEFAULT_WORKERS: u16 = 10;

    /// Default maximum number of source connections.
    pub const DEFAULT_CONNECTIONS: u32 = 10;

    /// Default maximum number of build attempts.
    pub const DEFAULT_MAX_RETRIES: u32 = 5;

    /// Default delay between build attempts.
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

    /// Default upper bound of the pre-build jitter.
    pub const DEFAULT_MAX_JITTER_MS: u64 = 100;

    /// Validates the export configuration, including the schema tree.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection.tls.validate()?;

        if self.workers == 0 {
            return Err(ValidationError::WorkersZero);
        }

        if self.connections == 0 {
            return Err(ValidationError::ConnectionsZero);
        }

        if self.max_retries == 0 {
            return Err(ValidationError::MaxRetriesZero);
        }

        self.schema.validate()
    }

    /// Applies command-line overrides; `None` and zero leave the configured value untouched.
    pub fn apply_overrides(&mut self, workers: Option<u16>, connections: Option<u32>) {
        if let Some(workers) = workers.filter(|workers| *workers > 0) {
            self.workers = workers;
        }

        if let Some(connections) = connections.filter(|connections| *connections > 0) {
            self.connections = connections;
        }
    }
}

impl Config for ExportConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["schema.key", "schema.exclude"];
}

fn default_workers() -> u16 {
    ExportConfig::DEFAULT_WORKERS
}

fn default_connections() -> u32 {
    ExportConfig::DEFAULT_CONNECTIONS
}

fn default_max_retries() -> u32 {
    ExportConfig::DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    ExportConfig::DEFAULT_RETRY_DELAY_MS
}

fn default_max_jitter_ms() -> u64 {
    ExportConfig::DEFAULT_MAX_JITTER_MS
}
