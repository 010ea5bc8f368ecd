use std::future::Future;

use crate::error::EtlResult;
use crate::schema::IndexMapping;
use crate::types::Record;

/// Receives fully built root documents and, once the export has drained, the index mapping.
///
/// Implementations are shared by reference between the sink worker and the pipeline, so they
/// must synchronize their own state.
pub trait Destination {
    /// Returns the name of the destination, used in logs and metric labels.
    fn name() -> &'static str;

    /// Flushes buffered output. Called once after the last record was written.
    fn shutdown(&self) -> impl Future<Output = EtlResult<()>> + Send {
        async { Ok(()) }
    }

    /// Writes one root document.
    fn write_record(&self, record: Record) -> impl Future<Output = EtlResult<()>> + Send;

    /// Writes the index mapping inferred over the whole export.
    fn write_mapping(&self, mapping: &IndexMapping) -> impl Future<Output = EtlResult<()>> + Send;
}
