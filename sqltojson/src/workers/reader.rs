use std::sync::Arc;

use futures::StreamExt;
use metrics::counter;
use tracing::{Instrument, debug, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, EtlResult};
use crate::metrics::{SQLTOJSON_ROW_SCAN_FAILURES_TOTAL, WORKER_TYPE_LABEL};
use crate::schema::SchemaTree;
use crate::source::Source;
use crate::workers::base::{WorkerHandle, WorkerType};
use crate::workers::build::BuildTask;

/// Executes the root query once and queues one [`BuildTask`] per row.
///
/// Rows that fail to decode are skipped. The queue is closed when the reader exits, whatever the
/// reason, so that build workers drain it and stop.
pub struct SourceReader<S> {
    source: Arc<S>,
    tree: Arc<SchemaTree>,
    queue_tx: async_channel::Sender<BuildTask>,
    shutdown_rx: ShutdownRx,
}

impl<S> SourceReader<S>
where
    S: Source + Send + Sync + 'static,
{
    pub fn new(
        source: Arc<S>,
        tree: Arc<SchemaTree>,
        queue_tx: async_channel::Sender<BuildTask>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            source,
            tree,
            queue_tx,
            shutdown_rx,
        }
    }

    /// Spawns the reader. The handle resolves to the number of queued tasks.
    pub fn start(self) -> WorkerHandle<u64> {
        let span = tracing::info_span!("source_reader", source = S::name());
        let handle = tokio::spawn(self.run().instrument(span));

        WorkerHandle::new(WorkerType::Reader, handle)
    }

    async fn run(self) -> EtlResult<u64> {
        let Self {
            source,
            tree,
            queue_tx,
            mut shutdown_rx,
        } = self;

        let root = tree.root();
        let node = tree.node(root);
        info!(schema = node.doc_type(), "fetching root objects");

        let mut rows = source.stream_rows(node.query());
        let mut queued: u64 = 0;

        let result = loop {
            let item = tokio::select! {
                biased;

                _ = shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown requested, stopping source reader");
                    break Ok(());
                }
                item = rows.next() => item,
            };

            let record = match item {
                Some(Ok(record)) => record,
                Some(Err(err)) if err.kind() == ErrorKind::ConversionError => {
                    counter!(SQLTOJSON_ROW_SCAN_FAILURES_TOTAL, WORKER_TYPE_LABEL => "reader")
                        .increment(1);
                    warn!(error = %err, "failed to scan root row, skipping it");
                    continue;
                }
                Some(Err(err)) => break Err(err),
                None => break Ok(()),
            };

            let task = BuildTask {
                schema: root,
                record,
            };

            tokio::select! {
                biased;

                _ = shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown requested, stopping source reader");
                    break Ok(());
                }
                sent = queue_tx.send(task) => {
                    if sent.is_err() {
                        debug!("task queue closed, stopping source reader");
                        break Ok(());
                    }
                    queued += 1;
                }
            }
        };

        queue_tx.close();
        drop(rows);

        info!(queued, "queued root objects");

        result.map(|()| queued)
    }
}
