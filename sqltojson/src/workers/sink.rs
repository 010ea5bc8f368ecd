use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{Instrument, error, info};

use crate::concurrency::shutdown::ShutdownRx;
use crate::destination::Destination;
use crate::error::EtlResult;
use crate::metrics::{
    DESTINATION_LABEL, ERROR_KIND_LABEL, SQLTOJSON_RECORDS_DROPPED_TOTAL,
    SQLTOJSON_RECORDS_EMITTED_TOTAL,
};
use crate::types::Record;
use crate::workers::base::{WorkerHandle, WorkerType};

/// Writes finished documents to the destination.
///
/// A record the destination rejects is logged and dropped; it is neither retried nor fatal.
pub struct SinkWorker<D> {
    destination: Arc<D>,
    output_rx: mpsc::Receiver<Record>,
    shutdown_rx: ShutdownRx,
}

impl<D> SinkWorker<D>
where
    D: Destination + Send + Sync + 'static,
{
    pub fn new(
        destination: Arc<D>,
        output_rx: mpsc::Receiver<Record>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            destination,
            output_rx,
            shutdown_rx,
        }
    }

    /// Spawns the sink. The handle resolves to the number of records written.
    pub fn start(self) -> WorkerHandle<u64> {
        let span = tracing::info_span!("sink_worker", destination = D::name());
        let handle = tokio::spawn(self.run().instrument(span));

        WorkerHandle::new(WorkerType::Sink, handle)
    }

    async fn run(mut self) -> EtlResult<u64> {
        let mut emitted: u64 = 0;

        loop {
            let record = tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown requested, stopping sink");
                    break;
                }
                record = self.output_rx.recv() => match record {
                    Some(record) => record,
                    None => break,
                }
            };

            match self.destination.write_record(record).await {
                Ok(()) => {
                    emitted += 1;
                    counter!(SQLTOJSON_RECORDS_EMITTED_TOTAL, DESTINATION_LABEL => D::name())
                        .increment(1);
                }
                Err(err) => {
                    counter!(
                        SQLTOJSON_RECORDS_DROPPED_TOTAL,
                        DESTINATION_LABEL => D::name(),
                        ERROR_KIND_LABEL => format!("{:?}", err.kind())
                    )
                    .increment(1);
                    error!(error = %err, "failed to write record, skipping it");
                }
            }
        }

        info!(emitted, "sink finished");

        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::destination::memory::MemoryDestination;
    use crate::types::Value;

    fn record(id: i32) -> Record {
        [("id", Value::I32(id))].into_iter().collect()
    }

    #[tokio::test]
    async fn failed_write_drops_only_that_record() {
        let destination = MemoryDestination::new();
        destination.fail_next_writes(1).await;

        let (output_tx, output_rx) = mpsc::channel(3);
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let sink = SinkWorker::new(Arc::new(destination.clone()), output_rx, shutdown_rx).start();

        for id in 1..=3 {
            output_tx.send(record(id)).await.unwrap();
        }
        drop(output_tx);

        let emitted = sink.wait().await.unwrap();

        assert_eq!(emitted, 2);
        assert_eq!(destination.write_attempts().await, 3);
        assert_eq!(destination.records().await, vec![record(2), record(3)]);
    }
}
