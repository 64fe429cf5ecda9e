//! Type definitions for the functor pool
//!
//! Contains the messages exchanged over the task and result channels,
//! pool configuration, lifecycle state and statistics.

use std::fmt;

use crate::error::{PoolError, Result};

/// Configuration for a pool built from a single cloneable functor
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub num_workers: usize,
    pub chunk_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            chunk_size: 1,
        }
    }
}

impl PoolConfig {
    pub fn new(num_workers: usize, chunk_size: usize) -> Self {
        Self {
            num_workers,
            chunk_size,
        }
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Reject settings that would make the pool unusable
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(PoolError::Validation(
                "num_workers must be at least 1".to_string(),
            ));
        }
        validate_chunk_size(self.chunk_size)
    }
}

pub(crate) fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(PoolError::Validation(
            "chunk_size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// A tagged batch of input items dispatched as one message
#[derive(Debug, Clone)]
pub struct Chunk<I> {
    pub epoch: u64,
    pub seq: u64,
    pub items: Vec<I>,
}

/// Message type for distributing work to workers
#[derive(Debug)]
pub(crate) enum Task<I> {
    Chunk(Chunk<I>),
    Stop,
}

/// Result of processing one chunk
#[derive(Debug)]
pub(crate) struct ChunkResult<O> {
    pub epoch: u64,
    pub seq: u64,
    pub worker_id: usize,
    pub outcome: std::result::Result<Vec<O>, anyhow::Error>,
}

/// Lifecycle of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Constructed,
    Active,
    Stopped,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolState::Constructed => "constructed",
            PoolState::Active => "active",
            PoolState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters accumulated over the lifetime of a pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub chunks_dispatched: u64,
    pub chunks_released: u64,
    pub items_yielded: u64,
    pub stale_results_dropped: u64,
    /// Stale results that were failures; each one is a worker that exited
    pub stale_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PoolConfig::default();
        assert!(config.num_workers >= 1);
        assert_eq!(config.chunk_size, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = PoolConfig::new(2, 0).validate().unwrap_err();
        assert!(matches!(err, PoolError::Validation(_)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = PoolConfig::default()
            .with_num_workers(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("num_workers"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PoolState::Stopped.to_string(), "stopped");
        assert_eq!(PoolState::Active.to_string(), "active");
    }
}
