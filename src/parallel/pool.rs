//! Functor pool
//!
//! Contains `FunctorPool`, which owns the worker threads and the two shared
//! channels, and `Imap`, the ordered parallel map it hands back to callers.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

use crate::error::{PoolError, Result};

use super::batching::{chunked, Chunked};
use super::ready::ReadyLatch;
use super::sequencer::Sequencer;
use super::types::{Chunk, ChunkResult, PoolConfig, PoolState, PoolStats, Task};
use super::worker::{worker_thread, Functor, Worker};

/// A fixed set of workers applying a functor in parallel, with ordered output
///
/// Work is dispatched FIFO over a bounded task channel whose capacity equals
/// the worker count; results come back over an unbounded result channel and
/// are put back into submission order before the caller sees them.
///
/// Dropping an active pool stops and joins its workers.
pub struct FunctorPool<F: Functor> {
    workers: Vec<Worker<F>>,
    worker_ids: Vec<usize>,
    task_sender: Sender<Task<F::Input>>,
    task_receiver: Option<Receiver<Task<F::Input>>>,
    result_sender: Option<Sender<ChunkResult<F::Output>>>,
    result_receiver: Receiver<ChunkResult<F::Output>>,
    latch: Arc<ReadyLatch>,
    handles: Vec<(usize, JoinHandle<()>)>,
    started: usize,
    state: PoolState,
    epoch: u64,
    stats: PoolStats,
}

impl<F: Functor> FunctorPool<F> {
    /// Register workers; ids missing on a worker become its list position
    pub fn new(mut workers: Vec<Worker<F>>) -> Self {
        let worker_ids = workers
            .iter_mut()
            .enumerate()
            .map(|(position, worker)| worker.assign_id(position))
            .collect();

        let (task_sender, task_receiver) = bounded(workers.len());
        let (result_sender, result_receiver) = unbounded();

        Self {
            workers,
            worker_ids,
            task_sender,
            task_receiver: Some(task_receiver),
            result_sender: Some(result_sender),
            result_receiver,
            latch: Arc::new(ReadyLatch::new()),
            handles: Vec::new(),
            started: 0,
            state: PoolState::Constructed,
            epoch: 0,
            stats: PoolStats::default(),
        }
    }

    /// `num_workers` private copies of one functor
    pub fn replicate(functor: F, num_workers: usize) -> Self
    where
        F: Clone,
    {
        let workers = (0..num_workers)
            .map(|_| Worker::new(functor.clone()))
            .collect();
        Self::new(workers)
    }

    pub fn with_config(config: &PoolConfig, functor: F) -> Result<Self>
    where
        F: Clone,
    {
        config.validate()?;
        Ok(Self::replicate(functor, config.num_workers))
    }

    /// Start the pool, run `body` against it, then stop and join the workers
    ///
    /// The workers are also stopped if `body` panics.
    pub fn scope<R>(workers: Vec<Worker<F>>, body: impl FnOnce(&mut Self) -> R) -> Result<R> {
        let mut pool = Self::new(workers);
        pool.start()?;
        let value = body(&mut pool);
        pool.shutdown()?;
        Ok(value)
    }

    /// Spawn one thread per registered worker
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(PoolState::Constructed)?;
        self.state = PoolState::Active;

        // Workers hold the only task receivers and result senders from here on,
        // so a pool whose workers all died sees disconnection instead of blocking.
        let (Some(task_receiver), Some(result_sender)) =
            (self.task_receiver.take(), self.result_sender.take())
        else {
            unreachable!("channels are only taken when leaving the constructed state");
        };

        for worker in std::mem::take(&mut self.workers) {
            let worker_id = worker.id().unwrap_or(self.started);
            let work_receiver = task_receiver.clone();
            let result_sender = result_sender.clone();
            let latch = Arc::clone(&self.latch);
            let functor = worker.into_functor();

            let handle = thread::Builder::new()
                .name(format!("functor-worker-{worker_id}"))
                .spawn(move || {
                    worker_thread(worker_id, functor, work_receiver, result_sender, latch)
                })?;
            self.handles.push((worker_id, handle));
            self.started += 1;
        }

        debug!(workers = self.started, "functor pool started");
        Ok(())
    }

    /// Block until every started worker has returned from its setup hook
    pub fn until_all_ready(&self) -> Result<()> {
        self.expect_state(PoolState::Active)?;
        match self.latch.wait(self.started) {
            Some((worker_id, message)) => Err(PoolError::Setup { worker_id, message }),
            None => Ok(()),
        }
    }

    /// Send one stop message per worker and join all worker threads
    ///
    /// Safe to call more than once. Workers that already exited are joined
    /// like any other.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.state {
            PoolState::Stopped => return Ok(()),
            PoolState::Constructed => {
                self.state = PoolState::Stopped;
                self.workers.clear();
                return Ok(());
            }
            PoolState::Active => {}
        }
        self.state = PoolState::Stopped;

        debug!(workers = self.handles.len(), "stopping functor pool");
        for _ in 0..self.handles.len() {
            if self.task_sender.send(Task::Stop).is_err() {
                // every worker has already exited
                break;
            }
        }

        let mut panicked = None;
        for (worker_id, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                error!(worker_id, "worker thread panicked");
                panicked.get_or_insert(worker_id);
            }
        }

        match panicked {
            Some(worker_id) => Err(PoolError::WorkerPanicked { worker_id }),
            None => Ok(()),
        }
    }

    /// Ordered parallel map over `items`, dispatched in chunks of `chunk_size`
    ///
    /// Outputs are produced lazily and in input order. The pool can run any
    /// number of `imap` calls one after another while it is active.
    pub fn imap<It>(&mut self, items: It, chunk_size: usize) -> Result<Imap<'_, F, It::IntoIter>>
    where
        It: IntoIterator<Item = F::Input>,
    {
        let chunks = chunked(items, chunk_size)?;
        self.expect_state(PoolState::Active)?;

        self.epoch += 1;
        let epoch = self.epoch;
        debug!(epoch, chunk_size, "imap started");

        Ok(Imap {
            pool: self,
            chunks,
            sequencer: Sequencer::new(),
            released_items: VecDeque::new(),
            failure: None,
            epoch,
            next_seq: 0,
            dispatched: 0,
            released: 0,
            input_done: false,
            workers_gone: false,
            finished: false,
        })
    }

    /// Collect the outputs of [`imap`](Self::imap), stopping at the first error
    pub fn map<It>(&mut self, items: It, chunk_size: usize) -> Result<Vec<F::Output>>
    where
        It: IntoIterator<Item = F::Input>,
    {
        self.imap(items, chunk_size)?.collect()
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Ids of the registered workers, in registration order
    pub fn worker_ids(&self) -> &[usize] {
        &self.worker_ids
    }

    pub fn len(&self) -> usize {
        self.worker_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worker_ids.is_empty()
    }

    fn expect_state(&self, expected: PoolState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PoolError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

impl<F: Functor> Drop for FunctorPool<F> {
    fn drop(&mut self) {
        if self.state == PoolState::Active {
            if let Err(err) = self.shutdown() {
                warn!(error = %err, "functor pool shutdown reported an error");
            }
        }
    }
}

/// Lazy, single-pass stream of outputs from one [`FunctorPool::imap`] call
///
/// Yields `Ok(output)` for every input item in input order. A failed chunk
/// takes its place in that order: every output of earlier chunks is yielded
/// first, then a single `Err`, and then the stream ends.
pub struct Imap<'p, F: Functor, It: Iterator<Item = F::Input>> {
    pool: &'p mut FunctorPool<F>,
    chunks: Chunked<It>,
    sequencer: Sequencer<Result<Vec<F::Output>>>,
    released_items: VecDeque<F::Output>,
    failure: Option<PoolError>,
    epoch: u64,
    next_seq: u64,
    dispatched: u64,
    released: u64,
    input_done: bool,
    /// The task channel closed under us: no worker is left to take work
    workers_gone: bool,
    finished: bool,
}

impl<F: Functor, It: Iterator<Item = F::Input>> Imap<'_, F, It> {
    /// Chunks sent to the workers so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Chunks whose outputs have been handed over in order so far
    pub fn released(&self) -> u64 {
        self.released
    }

    /// Move the stream forward by one dispatch or one blocking receive
    fn advance(&mut self) -> Result<()> {
        if !self.input_done {
            match self.chunks.next() {
                Some(items) => {
                    if self.dispatch(items) {
                        self.drain_ready_results()?;
                    } else {
                        // Results already sent by the exited workers may
                        // still explain why, so keep receiving.
                        debug!(epoch = self.epoch, "task channel closed, draining results");
                        self.workers_gone = true;
                        self.input_done = true;
                    }
                }
                None => self.input_done = true,
            }
            return Ok(());
        }

        if self.released >= self.dispatched {
            if self.workers_gone {
                // every dispatched chunk succeeded, but input is left over
                return Err(PoolError::Disconnected("task"));
            }
            debug!(epoch = self.epoch, chunks = self.dispatched, "imap finished");
            self.finished = true;
            return Ok(());
        }

        let result = self.pool.result_receiver.recv().map_err(|_| {
            if self.workers_gone {
                PoolError::Disconnected("task")
            } else {
                PoolError::Disconnected("result")
            }
        })?;
        self.absorb(result)
    }

    /// Send one chunk; `false` when every worker has exited
    fn dispatch(&mut self, items: Vec<F::Input>) -> bool {
        let seq = self.next_seq;
        trace!(epoch = self.epoch, seq, items = items.len(), "dispatching chunk");

        let chunk = Chunk {
            epoch: self.epoch,
            seq,
            items,
        };
        if self.pool.task_sender.send(Task::Chunk(chunk)).is_err() {
            return false;
        }

        self.next_seq += 1;
        self.dispatched += 1;
        self.pool.stats.chunks_dispatched += 1;
        true
    }

    /// Take whatever results are already waiting, without blocking
    fn drain_ready_results(&mut self) -> Result<()> {
        loop {
            match self.pool.result_receiver.try_recv() {
                Ok(result) => self.absorb(result)?,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    fn absorb(&mut self, result: ChunkResult<F::Output>) -> Result<()> {
        let ChunkResult {
            epoch,
            seq,
            worker_id,
            outcome,
        } = result;

        if epoch != self.epoch {
            trace!(epoch, seq, "dropping result of an earlier imap");
            self.pool.stats.stale_results_dropped += 1;
            if let Err(err) = &outcome {
                warn!(
                    worker_id,
                    epoch,
                    seq,
                    error = %format!("{err:#}"),
                    "worker exited on a chunk of an abandoned imap"
                );
                self.pool.stats.stale_failures += 1;
            }
            return Ok(());
        }

        let outcome = outcome.map_err(|source| PoolError::Transform {
            worker_id,
            seq,
            source,
        });

        for released in self.sequencer.submit(seq, outcome)? {
            self.released += 1;
            self.pool.stats.chunks_released += 1;
            self.released_items.extend(released?);
        }
        Ok(())
    }
}

impl<F: Functor, It: Iterator<Item = F::Input>> Iterator for Imap<'_, F, It> {
    type Item = Result<F::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(output) = self.released_items.pop_front() {
                self.pool.stats.items_yielded += 1;
                return Some(Ok(output));
            }
            if let Some(err) = self.failure.take() {
                return Some(Err(err));
            }
            if self.finished {
                return None;
            }
            if let Err(err) = self.advance() {
                error!(epoch = self.epoch, error = %err, "imap aborted");
                self.finished = true;
                self.failure = Some(err);
            }
        }
    }
}

impl<F: Functor, It: Iterator<Item = F::Input>> Drop for Imap<'_, F, It> {
    fn drop(&mut self) {
        let outstanding = self.dispatched - self.released;
        if outstanding > 0 {
            debug!(
                epoch = self.epoch,
                outstanding, "imap dropped before all chunks were released"
            );
        }
    }
}
