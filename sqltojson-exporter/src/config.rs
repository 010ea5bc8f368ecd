use std::path::Path;

use sqltojson_config::load_config;
use sqltojson_config::shared::ExportConfig;
use tracing::info;

use crate::error::{ExporterError, ExporterResult};

/// Loads the export configuration, applies command-line overrides, and validates the result.
pub fn load_export_config(
    path: &Path,
    workers: Option<u16>,
    connections: Option<u32>,
) -> ExporterResult<ExportConfig> {
    let mut config = load_config::<ExportConfig>(path).map_err(ExporterError::config)?;
    config.apply_overrides(workers, connections);
    config.validate().map_err(ExporterError::config)?;

    info!(
        path = %path.display(),
        workers = config.workers,
        connections = config.connections,
        max_retries = config.max_retries,
        "loaded export configuration"
    );

    Ok(config)
}
