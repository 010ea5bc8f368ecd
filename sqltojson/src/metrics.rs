//! Metrics definitions for export monitoring.
//!
//! Metrics are recorded through the `metrics` facade; nothing is exported unless the embedding
//! process installs a recorder.

/// Label for the worker type in metrics.
pub const WORKER_TYPE_LABEL: &str = "worker_type";

/// Label for the destination name in metrics.
pub const DESTINATION_LABEL: &str = "destination";

/// Label for error kind in metrics.
pub const ERROR_KIND_LABEL: &str = "error_kind";

/// Counter for root records fully built and handed to the destination.
pub const SQLTOJSON_RECORDS_EMITTED_TOTAL: &str = "sqltojson_records_emitted_total";

/// Counter for root records that failed to reach the destination.
pub const SQLTOJSON_RECORDS_DROPPED_TOTAL: &str = "sqltojson_records_dropped_total";

/// Counter for failed build attempts that were retried.
pub const SQLTOJSON_BUILD_RETRIES_TOTAL: &str = "sqltojson_build_retries_total";

/// Counter for root rows skipped because they could not be decoded.
pub const SQLTOJSON_ROW_SCAN_FAILURES_TOTAL: &str = "sqltojson_row_scan_failures_total";

/// Histogram for the time taken to build one root record, nested queries included.
pub const SQLTOJSON_BUILD_DURATION_SECONDS: &str = "sqltojson_build_duration_seconds";

/// Gauge for the average build time reported by the stats worker.
pub const SQLTOJSON_AVERAGE_BUILD_SECONDS: &str = "sqltojson_average_build_seconds";

/// Gauge for the wall-clock build throughput reported by the stats worker.
pub const SQLTOJSON_BUILDS_PER_SECOND: &str = "sqltojson_builds_per_second";
