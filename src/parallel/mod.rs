//! Ordered parallel functor pool
//!
//! This module runs a user-supplied transformation over a stream of inputs on
//! a fixed set of worker threads and hands the outputs back in input order.
//!
//! # Module Structure
//!
//! - `types`: Channel messages, configuration, lifecycle state and statistics
//! - `batching`: Lazy chunking of the input stream
//! - `sequencer`: Sequencing buffer restoring submission order
//! - `ready`: Readiness latch backing `until_all_ready`
//! - `worker`: `Functor` trait, `Worker` wrapper and the worker thread
//! - `pool`: `FunctorPool` orchestration and the `Imap` stream

mod batching;
mod pool;
mod ready;
mod sequencer;
mod types;
mod worker;

pub use batching::{chunked, Chunked};
pub use pool::{FunctorPool, Imap};
pub use sequencer::{Released, Sequencer};
pub use types::{Chunk, PoolConfig, PoolState, PoolStats};
pub use worker::{from_map, FnFunctor, Functor, Worker};
