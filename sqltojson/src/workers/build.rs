use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::builder::build_record;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::metrics::{
    SQLTOJSON_BUILD_DURATION_SECONDS, SQLTOJSON_BUILD_RETRIES_TOTAL, WORKER_TYPE_LABEL,
};
use crate::schema::{SchemaId, SchemaTree};
use crate::source::Source;
use crate::types::Record;

/// One root row waiting to be built with the schema node it belongs to.
///
/// Only root rows are queued; their nested levels are built inside the worker that pops them.
#[derive(Debug, Clone)]
pub struct BuildTask {
    pub schema: SchemaId,
    pub record: Record,
}

/// Retry and pacing settings shared by every build worker.
#[derive(Debug, Clone, Copy)]
pub struct BuildWorkerConfig {
    /// Attempts allowed per root record; exhausting them fails the export.
    pub max_retries: u32,
    /// Pause between two attempts of the same record.
    pub retry_delay: Duration,
    /// Upper bound of the random pause taken before each build.
    pub max_jitter: Duration,
}

/// Outcome of building one task.
enum BuildOutcome {
    Built { record: Record, duration: Duration },
    Cancelled,
}

/// Pops root rows from the task queue, builds them, and forwards the results.
pub struct BuildWorker<S> {
    config: BuildWorkerConfig,
    source: Arc<S>,
    tree: Arc<SchemaTree>,
    queue_rx: async_channel::Receiver<BuildTask>,
    output_tx: mpsc::Sender<Record>,
    stats_tx: mpsc::Sender<Duration>,
    shutdown_rx: ShutdownRx,
}

impl<S> BuildWorker<S>
where
    S: Source + Send + Sync + 'static,
{
    pub fn new(
        config: BuildWorkerConfig,
        source: Arc<S>,
        tree: Arc<SchemaTree>,
        queue_rx: async_channel::Receiver<BuildTask>,
        output_tx: mpsc::Sender<Record>,
        stats_tx: mpsc::Sender<Duration>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            config,
            source,
            tree,
            queue_rx,
            output_tx,
            stats_tx,
            shutdown_rx,
        }
    }

    /// Runs until the queue is closed and drained, or shutdown is requested.
    ///
    /// Fails only when a record exhausts its build attempts.
    pub async fn run(mut self) -> EtlResult<()> {
        debug!("build worker started");

        loop {
            let task = tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown requested, stopping build worker");
                    return Ok(());
                }
                task = self.queue_rx.recv() => match task {
                    Ok(task) => task,
                    Err(_) => {
                        debug!("task queue closed and drained, stopping build worker");
                        return Ok(());
                    }
                }
            };

            self.jitter().await;

            let (record, duration) = match self.build_with_retry(&task).await? {
                BuildOutcome::Built { record, duration } => (record, duration),
                BuildOutcome::Cancelled => {
                    info!("shutdown requested while retrying, stopping build worker");
                    return Ok(());
                }
            };

            histogram!(SQLTOJSON_BUILD_DURATION_SECONDS, WORKER_TYPE_LABEL => "build")
                .record(duration.as_secs_f64());

            tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown requested, dropping built record");
                    return Ok(());
                }
                result = self.output_tx.send(record) => {
                    if result.is_err() {
                        warn!("output channel closed, stopping build worker");
                        return Ok(());
                    }
                }
            }

            tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown requested, dropping build sample");
                    return Ok(());
                }
                result = self.stats_tx.send(duration) => {
                    if result.is_err() {
                        debug!("stats channel closed, build sample dropped");
                    }
                }
            }
        }
    }

    /// Desynchronizes workers so that they do not hit the source database in lockstep.
    async fn jitter(&self) {
        let max_jitter_ms = self.config.max_jitter.as_millis() as u64;
        if max_jitter_ms == 0 {
            return;
        }

        let jitter_ms = rand::thread_rng().gen_range(0..=max_jitter_ms);
        sleep(Duration::from_millis(jitter_ms)).await;
    }

    /// Builds `task`, starting over from the original row after each failure.
    async fn build_with_retry(&mut self, task: &BuildTask) -> EtlResult<BuildOutcome> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut record = task.record.clone();
            let started = Instant::now();

            let err = match build_record(&*self.source, &self.tree, task.schema, &mut record).await
            {
                Ok(()) => {
                    return Ok(BuildOutcome::Built {
                        record,
                        duration: started.elapsed(),
                    });
                }
                Err(err) => err,
            };

            if attempt >= self.config.max_retries {
                error!(
                    attempt,
                    max_retries = self.config.max_retries,
                    error = %err,
                    "build attempts exhausted"
                );

                return Err(etl_error!(
                    ErrorKind::BuildRetriesExhausted,
                    "Reached the maximum number of build attempts",
                    format!("gave up after {attempt} attempts: {err}"),
                    source: err
                ));
            }

            counter!(SQLTOJSON_BUILD_RETRIES_TOTAL, WORKER_TYPE_LABEL => "build").increment(1);
            warn!(
                attempt,
                max_retries = self.config.max_retries,
                retry_delay_ms = self.config.retry_delay.as_millis() as u64,
                error = %err,
                "failed to build record, retrying"
            );

            tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => return Ok(BuildOutcome::Cancelled),
                _ = sleep(self.config.retry_delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sqltojson_config::shared::SchemaConfig;

    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::source::memory::MemorySource;
    use crate::types::Value;

    const PATIENTS: &str = "select * from patient";
    const VISITS: &str = "select * from visit where patient_id = :id";

    fn tree() -> Arc<SchemaTree> {
        let visits = SchemaConfig {
            doc_type: "visit".to_string(),
            sql: VISITS.to_string(),
            ..Default::default()
        };

        let mut patient = SchemaConfig {
            doc_type: "patient".to_string(),
            key: vec!["id".to_string()],
            sql: PATIENTS.to_string(),
            ..Default::default()
        };
        patient.nested.insert("visits".to_string(), visits);

        Arc::new(SchemaTree::from_config(&patient).unwrap())
    }

    async fn source() -> MemorySource {
        let source = MemorySource::new();
        source
            .add_resolver(VISITS, |params| {
                let id = params.get("id").cloned().unwrap_or(Value::Null);
                vec![[("patient_id", id)].into_iter().collect()]
            })
            .await;
        source
    }

    struct WorkerRun {
        result: EtlResult<()>,
        records: Vec<Record>,
        samples: Vec<Duration>,
    }

    /// Runs one worker over `roots` queued patients until the queue is drained.
    async fn run_worker(source: MemorySource, roots: i32, max_retries: u32) -> WorkerRun {
        let tree = tree();
        let capacity = roots as usize;

        let (queue_tx, queue_rx) = async_channel::bounded(capacity);
        for id in 1..=roots {
            let record: Record = [("id", Value::I32(id))].into_iter().collect();
            queue_tx
                .send(BuildTask {
                    schema: tree.root(),
                    record,
                })
                .await
                .unwrap();
        }
        queue_tx.close();

        let (output_tx, mut output_rx) = mpsc::channel(capacity);
        let (stats_tx, mut stats_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let worker = BuildWorker::new(
            BuildWorkerConfig {
                max_retries,
                retry_delay: Duration::from_millis(1),
                max_jitter: Duration::ZERO,
            },
            Arc::new(source),
            tree,
            queue_rx,
            output_tx,
            stats_tx,
            shutdown_rx,
        );
        let result = worker.run().await;
        drop(shutdown_tx);

        let mut records = Vec::new();
        while let Some(record) = output_rx.recv().await {
            records.push(record);
        }
        let mut samples = Vec::new();
        while let Some(sample) = stats_rx.recv().await {
            samples.push(sample);
        }

        WorkerRun {
            result,
            records,
            samples,
        }
    }

    #[tokio::test]
    async fn retried_build_emits_one_record_and_one_sample() {
        let source = source().await;
        source.fail_next(VISITS, 2).await;

        let run = run_worker(source.clone(), 1, 3).await;

        assert!(run.result.is_ok());
        assert_eq!(run.records.len(), 1);
        assert_eq!(run.samples.len(), 1);
        assert_eq!(source.executions(VISITS).await, 3);

        let Some(Value::Nested(visits)) = run.records[0].get("visits") else {
            panic!("visits were not attached");
        };
        assert_eq!(visits.len(), 1);
    }

    #[tokio::test]
    async fn every_root_yields_one_sample() {
        let source = source().await;
        source.fail_next(VISITS, 1).await;

        let run = run_worker(source, 4, 2).await;

        assert!(run.result.is_ok());
        assert_eq!(run.records.len(), 4);
        assert_eq!(run.samples.len(), 4);
    }

    #[tokio::test]
    async fn exhausted_build_emits_nothing() {
        let source = source().await;
        source.fail_next(VISITS, 100).await;

        let run = run_worker(source.clone(), 1, 2).await;

        let err = run.result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BuildRetriesExhausted);
        assert!(run.records.is_empty());
        assert!(run.samples.is_empty());
        assert_eq!(source.executions(VISITS).await, 2);
    }
}
