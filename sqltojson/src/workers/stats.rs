use std::fmt;
use std::time::{Duration, Instant};

use metrics::gauge;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::EtlResult;
use crate::metrics::{SQLTOJSON_AVERAGE_BUILD_SECONDS, SQLTOJSON_BUILDS_PER_SECOND};
use crate::workers::base::{WorkerHandle, WorkerType};

/// Throughput figures computed after a build sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    /// Samples counted since the reference sample.
    pub count: u64,
    /// Builds per second of cumulative build time.
    pub average_build: f64,
    /// Builds per second of wall-clock time.
    pub concurrency: f64,
    /// Wall-clock rate weighted by the average build time.
    pub builds_per_second: f64,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CNT: {}, ABT: {:.6}, CONC: {:.6}, BPS: {:.6}",
            self.count, self.average_build, self.concurrency, self.builds_per_second
        )
    }
}

/// Running aggregate of build durations.
///
/// The first sample only sets the wall-clock reference, so warm-up of the pipeline does not skew
/// the rates. Counting starts with the second sample.
#[derive(Debug, Default)]
pub struct BuildStats {
    start: Option<Instant>,
    count: u64,
    total: Duration,
}

impl BuildStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample observed at `now` and returns the updated report.
    pub fn record(&mut self, sample: Duration, now: Instant) -> Option<StatsReport> {
        let Some(start) = self.start else {
            self.start = Some(now);
            return None;
        };

        self.count += 1;
        self.total += sample;

        let count = self.count as f64;
        let average_build = rate(count, self.total.as_secs_f64());
        let concurrency = rate(count, now.saturating_duration_since(start).as_secs_f64());

        Some(StatsReport {
            count: self.count,
            average_build,
            concurrency,
            builds_per_second: concurrency * average_build,
        })
    }
}

fn rate(count: f64, secs: f64) -> f64 {
    if secs > 0.0 { count / secs } else { 0.0 }
}

/// Consumes build durations and writes a progress line after each one.
pub struct StatsWorker {
    stats_rx: mpsc::Receiver<Duration>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    shutdown_rx: ShutdownRx,
}

impl StatsWorker {
    pub fn new(
        stats_rx: mpsc::Receiver<Duration>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            stats_rx,
            writer,
            shutdown_rx,
        }
    }

    /// Spawns the worker. The handle resolves to the last report, if any.
    pub fn start(self) -> WorkerHandle<Option<StatsReport>> {
        let span = tracing::info_span!("stats_worker");
        let handle = tokio::spawn(self.run().instrument(span));

        WorkerHandle::new(WorkerType::Stats, handle)
    }

    async fn run(mut self) -> EtlResult<Option<StatsReport>> {
        let mut stats = BuildStats::new();
        let mut last_report = None;

        loop {
            let sample = tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown requested, stopping stats writer");
                    break;
                }
                sample = self.stats_rx.recv() => match sample {
                    Some(sample) => sample,
                    None => break,
                }
            };

            let Some(report) = stats.record(sample, Instant::now()) else {
                continue;
            };

            gauge!(SQLTOJSON_AVERAGE_BUILD_SECONDS).set(rate(1.0, report.average_build));
            gauge!(SQLTOJSON_BUILDS_PER_SECOND).set(report.concurrency);

            self.write_line(format!("\r{report}").as_bytes()).await;
            last_report = Some(report);
        }

        if last_report.is_some() {
            self.write_line(b"\n").await;
        }

        Ok(last_report)
    }

    /// Writes progress output; failures only lose the progress line.
    async fn write_line(&mut self, line: &[u8]) {
        let result = async {
            self.writer.write_all(line).await?;
            self.writer.flush().await
        }
        .await;

        if let Err(err) = result {
            debug!(error = %err, "failed to write stats line");
        }
    }
}
