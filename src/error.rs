//! Error taxonomy for the functor pool

use thiserror::Error;

use crate::parallel::PoolState;

/// Errors reported by the pool, its workers and the sequencing buffer
#[derive(Debug, Error)]
pub enum PoolError {
    /// Caller-facing argument error, raised before anything is dispatched
    #[error("invalid argument: {0}")]
    Validation(String),

    /// A sequence number arrived that was already released or is still pending
    #[error("sequence number {seq} submitted twice (next expected is {next_expected})")]
    DuplicateSequence { seq: u64, next_expected: u64 },

    /// A worker's transform failed on an item of chunk `seq`; the worker has exited
    #[error("worker {worker_id} failed while processing chunk {seq}")]
    Transform {
        worker_id: usize,
        seq: u64,
        #[source]
        source: anyhow::Error,
    },

    /// A worker's setup hook failed or panicked
    #[error("worker {worker_id} failed during setup: {message}")]
    Setup { worker_id: usize, message: String },

    #[error("pool is {actual}, expected {expected}")]
    InvalidState {
        expected: PoolState,
        actual: PoolState,
    },

    /// Every worker holding the other end of a channel has exited
    #[error("{0} channel disconnected: no live workers")]
    Disconnected(&'static str),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker {worker_id} panicked")]
    WorkerPanicked { worker_id: usize },
}

pub type Result<T, E = PoolError> = std::result::Result<T, E>;
