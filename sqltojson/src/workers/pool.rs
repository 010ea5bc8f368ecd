use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info};

use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::schema::SchemaTree;
use crate::source::Source;
use crate::types::Record;
use crate::workers::build::{BuildTask, BuildWorker, BuildWorkerConfig};

/// Fixed set of [`BuildWorker`]s sharing one task queue.
#[derive(Debug)]
pub struct BuildWorkerPool {
    join_set: JoinSet<(u16, EtlResult<()>)>,
}

impl BuildWorkerPool {
    /// Spawns `workers` build workers.
    ///
    /// The pool keeps no sender of its own: once every worker has exited, the output and stats
    /// channels close and their consumers finish.
    #[expect(clippy::too_many_arguments)]
    pub fn start<S>(
        workers: u16,
        config: BuildWorkerConfig,
        source: Arc<S>,
        tree: Arc<SchemaTree>,
        queue_rx: async_channel::Receiver<BuildTask>,
        output_tx: mpsc::Sender<Record>,
        stats_tx: mpsc::Sender<Duration>,
        shutdown_rx: ShutdownRx,
    ) -> Self
    where
        S: Source + Send + Sync + 'static,
    {
        info!(workers, "starting build workers");

        let mut join_set = JoinSet::new();
        for id in 1..=workers {
            let worker = BuildWorker::new(
                config,
                source.clone(),
                tree.clone(),
                queue_rx.clone(),
                output_tx.clone(),
                stats_tx.clone(),
                shutdown_rx.clone(),
            );

            let span = tracing::info_span!("build_worker", worker_id = id);
            join_set.spawn(
                async move {
                    let result = worker.run().await;
                    (id, result)
                }
                .instrument(span),
            );
        }

        Self { join_set }
    }

    /// Waits for every worker to exit.
    ///
    /// The first failing worker triggers shutdown so that the rest of the export stops instead of
    /// building records that will never be reported. All failures are returned together.
    pub async fn wait_all(mut self, shutdown_tx: &ShutdownTx) -> EtlResult<()> {
        let mut errors: Vec<EtlError> = Vec::new();

        while let Some(result) = self.join_set.join_next().await {
            let err = match result {
                Ok((_, Ok(()))) => continue,
                Ok((worker_id, Err(err))) => {
                    error!(worker_id, error = %err, "build worker failed");
                    err
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!("build worker task was cancelled");
                        continue;
                    }

                    etl_error!(
                        ErrorKind::WorkerPanic,
                        "Build worker panicked",
                        join_err
                    )
                }
            };

            if !shutdown_tx.is_shutdown() {
                info!("build worker failed, shutting down export");
                shutdown_tx.shutdown();
            }
            errors.push(err);
        }

        info!("all build workers finished");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}
