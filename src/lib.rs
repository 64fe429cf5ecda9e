//! Ordered parallel functor pool
//!
//! A fixed set of worker threads applies a [`Functor`] to a stream of inputs.
//! Inputs are split into chunks tagged with increasing sequence numbers, sent
//! FIFO over a bounded task channel, and the results coming back in whatever
//! order the workers finish are put back into input order by a [`Sequencer`]
//! before the caller sees them.
//!
//! ```no_run
//! use functor_pool::{from_map, FunctorPool};
//!
//! fn main() -> functor_pool::Result<()> {
//!     let workers = (0..4).map(|_| from_map(|x: u64| x * x)).collect();
//!     let squares = FunctorPool::scope(workers, |pool| pool.map(0..1000u64, 16))??;
//!     assert_eq!(squares[12], 144);
//!     Ok(())
//! }
//! ```

mod error;
pub mod parallel;

pub use error::{PoolError, Result};
pub use parallel::{
    chunked, from_map, Chunk, Chunked, FnFunctor, Functor, FunctorPool, Imap, PoolConfig,
    PoolState, PoolStats, Released, Sequencer, Worker,
};
