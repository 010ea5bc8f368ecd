use std::time::Instant;

use sqltojson::destination::bulk::BulkJsonDestination;
use sqltojson::pipeline::{Pipeline, PipelineConfig};
use sqltojson::schema::SchemaTree;
use sqltojson::source::postgres::PgSource;
use sqltojson_config::shared::ExportConfig;
use tracing::info;

use crate::error::ExporterResult;

/// Runs one export described by `config`.
///
/// The source connection and the data output are opened before any worker starts, so an
/// unreachable database or an unwritable data file fails fast.
#[tracing::instrument(skip_all, fields(index = %config.index, doc_type = %config.doc_type))]
pub async fn start_export(config: ExportConfig) -> ExporterResult<()> {
    let started = Instant::now();

    let tree = SchemaTree::from_config(&config.schema)?;
    let source = PgSource::connect(&config.connection, config.connections).await?;
    let destination =
        BulkJsonDestination::open(&config.files, &config.index, &config.doc_type).await?;

    let pipeline = Pipeline::new(
        PipelineConfig::from(&config),
        tree,
        source.clone(),
        destination,
    );

    let result = pipeline.run().await;
    source.close().await;
    let summary = result?;

    info!(
        queued = summary.queued,
        emitted = summary.emitted,
        took = ?started.elapsed(),
        "export completed"
    );

    Ok(())
}
