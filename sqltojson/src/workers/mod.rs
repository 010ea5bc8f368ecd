//! Long-running tasks of an export.
//!
//! The [`reader::SourceReader`] feeds root rows into the task queue, the
//! [`pool::BuildWorkerPool`] builds them, the [`sink::SinkWorker`] writes the finished documents and
//! the [`stats::StatsWorker`] reports build throughput.

pub mod base;
pub mod build;
pub mod pool;
pub mod reader;
pub mod sink;
pub mod stats;
