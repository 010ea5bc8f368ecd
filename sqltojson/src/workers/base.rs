use std::fmt;

use tokio::task::JoinHandle;
use tracing::error;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Identifies a worker in logs and errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerType {
    Reader,
    Sink,
    Stats,
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerType::Reader => write!(f, "reader"),
            WorkerType::Sink => write!(f, "sink"),
            WorkerType::Stats => write!(f, "stats"),
        }
    }
}

/// Handle of a spawned worker.
///
/// Waiting on the handle returns the worker's own result; a panic inside the worker becomes an
/// [`ErrorKind::WorkerPanic`] error.
#[derive(Debug)]
pub struct WorkerHandle<T> {
    worker_type: WorkerType,
    handle: JoinHandle<EtlResult<T>>,
}

impl<T> WorkerHandle<T> {
    pub(crate) fn new(worker_type: WorkerType, handle: JoinHandle<EtlResult<T>>) -> Self {
        Self {
            worker_type,
            handle,
        }
    }

    pub fn worker_type(&self) -> WorkerType {
        self.worker_type
    }

    /// Waits for the worker to finish.
    pub async fn wait(self) -> EtlResult<T> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(worker = %self.worker_type, error = %err, "worker task failed to complete");
                Err(etl_error!(
                    ErrorKind::WorkerPanic,
                    "Worker panicked",
                    format!("{} worker: {err}", self.worker_type)
                ))
            }
        }
    }
}
