use thiserror::Error;

use crate::io::codec::SplatFormat;


#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("format error: {0}")]
    Format(String),

    #[error("unsupported {container} version: {version}")]
    UnsupportedVersion {
        container: &'static str,
        version: String,
    },

    #[error("{0:?} support not enabled, enable the matching io_* feature")]
    UnsupportedFormat(SplatFormat),

    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn truncated(container: &str, needed: usize, available: usize) -> Self {
        Self::Format(format!(
            "{container} data truncated: need {needed} bytes, have {available}",
        ))
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }

    pub fn is_unsupported_version(&self) -> bool {
        matches!(self, Self::UnsupportedVersion { .. })
    }
}


/// Returned synchronously by `WorkerPool::submit`; the pool stays usable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("task queue overflow (limit {limit})")]
    QueueOverflow { limit: usize },

    #[error("worker pool has been shut down")]
    ShutDown,

    #[error("no live workers remain in the pool")]
    NoWorkers,
}


/// What a task handle settles with when the task does not produce output.
#[derive(Debug, Error)]
pub enum TaskError<E: std::error::Error + 'static> {
    #[error("task failed: {0}")]
    Failed(#[source] E),

    #[error("worker {worker} faulted while running the task")]
    WorkerFault { worker: usize },

    #[error("task discarded by pool shutdown")]
    Cancelled,

    #[error("task discarded, no live workers remain")]
    NoWorkers,
}
