use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::destination::Destination;
use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::schema::IndexMapping;
use crate::types::Record;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<Record>,
    mapping: Option<IndexMapping>,
    shutdowns: u32,
    failing_writes: u32,
    write_attempts: u64,
}

/// In-memory destination capturing documents and the mapping.
///
/// Clones share the same storage, so a test can keep one handle while the pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record written so far, in write order.
    pub async fn records(&self) -> Vec<Record> {
        let inner = self.inner.lock().await;
        inner.records.clone()
    }

    /// Returns the mapping, if it was written.
    pub async fn mapping(&self) -> Option<IndexMapping> {
        let inner = self.inner.lock().await;
        inner.mapping.clone()
    }

    /// Makes the next `times` record writes fail with an I/O error.
    pub async fn fail_next_writes(&self, times: u32) {
        let mut inner = self.inner.lock().await;
        inner.failing_writes = times;
    }

    /// Returns how many record writes were attempted, failed ones included.
    pub async fn write_attempts(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.write_attempts
    }

    /// Returns how many times the destination was shut down.
    pub async fn shutdowns(&self) -> u32 {
        let inner = self.inner.lock().await;
        inner.shutdowns
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn shutdown(&self) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.shutdowns += 1;

        Ok(())
    }

    async fn write_record(&self, record: Record) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.write_attempts += 1;

        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            bail!(ErrorKind::IoError, "Injected write failure");
        }

        debug!(fields = record.len(), "writing record");
        inner.records.push(record);

        Ok(())
    }

    async fn write_mapping(&self, mapping: &IndexMapping) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        debug!(properties = mapping.properties().len(), "writing mapping");
        inner.mapping = Some(mapping.clone());

        Ok(())
    }
}
