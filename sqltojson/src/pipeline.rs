//! Orchestration of a complete export.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqltojson_config::shared::ExportConfig;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::concurrency::signal::spawn_signal_bridge;
use crate::destination::Destination;
use crate::error::{EtlError, EtlResult};
use crate::schema::SchemaTree;
use crate::source::Source;
use crate::workers::build::BuildWorkerConfig;
use crate::workers::pool::BuildWorkerPool;
use crate::workers::reader::SourceReader;
use crate::workers::sink::SinkWorker;
use crate::workers::stats::StatsWorker;

/// Runtime settings of a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of build workers, also the capacity of every channel.
    pub workers: u16,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_jitter: Duration,
    /// Whether SIGINT and SIGTERM trigger shutdown while the pipeline runs.
    pub handle_signals: bool,
}

impl From<&ExportConfig> for PipelineConfig {
    fn from(config: &ExportConfig) -> Self {
        Self {
            workers: config.workers,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
            handle_signals: true,
        }
    }
}

/// Totals of a finished export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Root rows handed to the build workers.
    pub queued: u64,
    /// Documents written to the destination.
    pub emitted: u64,
    pub elapsed: Duration,
}

/// Wires the source reader, build workers, sink and stats writer together.
///
/// Components start consumers first: signal bridge, stats writer, sink, build workers, and finally
/// the source reader. They are drained in reverse so that no built record is lost, and the mapping
/// is written only once every worker has exited.
pub struct Pipeline<S, D> {
    config: PipelineConfig,
    tree: Arc<SchemaTree>,
    source: Arc<S>,
    destination: Arc<D>,
    stats_writer: Box<dyn AsyncWrite + Send + Unpin>,
    shutdown_tx: ShutdownTx,
}

impl<S, D> Pipeline<S, D>
where
    S: Source + Send + Sync + 'static,
    D: Destination + Send + Sync + 'static,
{
    pub fn new(config: PipelineConfig, tree: SchemaTree, source: S, destination: D) -> Self {
        // Receivers are obtained through `subscribe`, so the initial one is not kept.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config,
            tree: Arc::new(tree),
            source: Arc::new(source),
            destination: Arc::new(destination),
            stats_writer: Box::new(tokio::io::stderr()),
            shutdown_tx,
        }
    }

    /// Replaces the progress output, standard error by default.
    pub fn with_stats_writer(mut self, writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        self.stats_writer = writer;
        self
    }

    /// Returns a handle that cancels the export when triggered.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn tree(&self) -> &SchemaTree {
        &self.tree
    }

    /// Runs the export to completion.
    ///
    /// A cancelled export is still a success: the records built so far are flushed and the mapping
    /// inferred from them is written. A failed export returns every worker error together and
    /// writes no mapping.
    pub async fn run(self) -> EtlResult<PipelineSummary> {
        let started = Instant::now();
        let Self {
            config,
            tree,
            source,
            destination,
            stats_writer,
            shutdown_tx,
        } = self;

        let signal_bridge = config
            .handle_signals
            .then(|| spawn_signal_bridge(shutdown_tx.clone()));

        let capacity = usize::from(config.workers.max(1));
        let (queue_tx, queue_rx) = async_channel::bounded(capacity);
        let (output_tx, output_rx) = mpsc::channel(capacity);
        let (stats_tx, stats_rx) = mpsc::channel(capacity);

        let stats = StatsWorker::new(stats_rx, stats_writer, shutdown_tx.subscribe()).start();
        let sink = SinkWorker::new(destination.clone(), output_rx, shutdown_tx.subscribe()).start();

        let pool = BuildWorkerPool::start(
            config.workers,
            BuildWorkerConfig {
                max_retries: config.max_retries,
                retry_delay: config.retry_delay,
                max_jitter: config.max_jitter,
            },
            source.clone(),
            tree.clone(),
            queue_rx,
            output_tx,
            stats_tx,
            shutdown_tx.subscribe(),
        );

        let reader = SourceReader::new(source, tree.clone(), queue_tx, shutdown_tx.subscribe()).start();

        let mut errors: Vec<EtlError> = Vec::new();

        // Both are awaited together so that a failing pool can unblock a reader waiting on a full
        // queue through shutdown.
        let (reader_result, pool_result) = tokio::join!(
            async {
                let result = reader.wait().await;
                if let Err(err) = &result {
                    error!(error = %err, "source reader failed, shutting down export");
                    shutdown_tx.shutdown();
                }
                result
            },
            pool.wait_all(&shutdown_tx)
        );

        let queued = match reader_result {
            Ok(queued) => queued,
            Err(err) => {
                errors.push(err);
                0
            }
        };
        if let Err(err) = pool_result {
            errors.push(err);
        }
        info!("workers done");

        let emitted = match sink.wait().await {
            Ok(emitted) => emitted,
            Err(err) => {
                errors.push(err);
                0
            }
        };
        if let Err(err) = stats.wait().await {
            errors.push(err);
        }
        if let Err(err) = destination.shutdown().await {
            errors.push(err);
        }
        info!(emitted, "data output done");

        if let Some(signal_bridge) = signal_bridge {
            signal_bridge.abort();
            let _ = signal_bridge.await;
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        if shutdown_tx.is_shutdown() {
            info!("export was cancelled, writing mapping of the records built so far");
        }

        destination.write_mapping(&tree.index_mapping()).await?;

        let summary = PipelineSummary {
            queued,
            emitted,
            elapsed: started.elapsed(),
        };
        info!(
            queued = summary.queued,
            emitted = summary.emitted,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "export finished"
        );

        Ok(summary)
    }
}
