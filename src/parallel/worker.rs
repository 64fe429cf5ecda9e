//! Worker thread for the functor pool
//!
//! Contains the `Functor` trait implemented by user transforms, the `Worker`
//! wrapper registered with a pool, and the thread body that runs the
//! setup / processing loop / teardown lifecycle.

use anyhow::anyhow;
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace};

use super::ready::{ReadyGuard, ReadyLatch};
use super::types::{ChunkResult, Task};

/// A per-item transformation applied by a worker
///
/// Each worker owns its own functor value, so implementations may keep
/// mutable state without any synchronisation.
pub trait Functor: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Runs once on the worker thread before any item is accepted
    fn setup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Transform one item; an error aborts the worker
    fn process(&mut self, item: Self::Input) -> anyhow::Result<Self::Output>;

    /// Runs once after the processing loop ends, however it ended
    fn teardown(&mut self) {}
}

/// Functor backed by a closure
pub struct FnFunctor<I, O, Func> {
    func: Func,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, Func> FnFunctor<I, O, Func>
where
    Func: FnMut(I) -> anyhow::Result<O>,
{
    pub fn new(func: Func) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

impl<I, O, Func: Clone> Clone for FnFunctor<I, O, Func> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
            _marker: PhantomData,
        }
    }
}

impl<I, O, Func> fmt::Debug for FnFunctor<I, O, Func> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFunctor").finish_non_exhaustive()
    }
}

impl<I, O, Func> Functor for FnFunctor<I, O, Func>
where
    I: Send + 'static,
    O: Send + 'static,
    Func: FnMut(I) -> anyhow::Result<O> + Send + 'static,
{
    type Input = I;
    type Output = O;

    fn process(&mut self, item: I) -> anyhow::Result<O> {
        (self.func)(item)
    }
}

/// A functor registered with a pool, plus its optional caller-chosen id
#[derive(Debug, Clone)]
pub struct Worker<F> {
    id: Option<usize>,
    functor: F,
}

impl<F: Functor> Worker<F> {
    pub fn new(functor: F) -> Self {
        Self { id: None, functor }
    }

    /// Fix the worker id instead of letting the pool use the list position
    pub fn with_id(mut self, id: usize) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<usize> {
        self.id
    }

    pub fn functor(&self) -> &F {
        &self.functor
    }

    pub(crate) fn assign_id(&mut self, position: usize) -> usize {
        *self.id.get_or_insert(position)
    }

    /// Unwrap the functor, e.g. to replicate it across a pool
    pub fn into_functor(self) -> F {
        self.functor
    }
}

impl<I, O, Func> Worker<FnFunctor<I, O, Func>>
where
    I: Send + 'static,
    O: Send + 'static,
    Func: FnMut(I) -> anyhow::Result<O> + Send + 'static,
{
    /// Worker running a fallible closure
    pub fn from_fn(func: Func) -> Self {
        Worker::new(FnFunctor::new(func))
    }
}

/// Worker running an infallible closure
pub fn from_map<I, O, M>(
    mut func: M,
) -> Worker<FnFunctor<I, O, impl FnMut(I) -> anyhow::Result<O> + Send + Clone + 'static>>
where
    I: Send + 'static,
    O: Send + 'static,
    M: FnMut(I) -> O + Send + Clone + 'static,
{
    Worker::new(FnFunctor::new(move |item: I| -> anyhow::Result<O> {
        Ok(func(item))
    }))
}

/// Runs `teardown` when dropped, including while unwinding
struct TeardownGuard<'a, F: Functor> {
    functor: &'a mut F,
    worker_id: usize,
}

impl<F: Functor> Drop for TeardownGuard<'_, F> {
    fn drop(&mut self) {
        debug!(worker_id = self.worker_id, "worker tearing down");
        self.functor.teardown();
    }
}

/// Worker thread: runs setup, processes chunks until told to stop, tears down
pub(crate) fn worker_thread<F: Functor>(
    worker_id: usize,
    mut functor: F,
    work_receiver: Receiver<Task<F::Input>>,
    result_sender: Sender<ChunkResult<F::Output>>,
    latch: Arc<ReadyLatch>,
) {
    let mut guard = TeardownGuard {
        functor: &mut functor,
        worker_id,
    };

    let ready = ReadyGuard::new(&latch, worker_id);
    match guard.functor.setup() {
        Ok(()) => ready.ready(),
        Err(err) => {
            error!(worker_id, error = %format!("{err:#}"), "worker setup failed");
            ready.failed(format!("{err:#}"));
            return;
        }
    }
    debug!(worker_id, "worker ready");

    while let Ok(task) = work_receiver.recv() {
        let chunk = match task {
            Task::Stop => {
                debug!(worker_id, "worker received stop");
                break;
            }
            Task::Chunk(chunk) => chunk,
        };

        trace!(worker_id, seq = chunk.seq, items = chunk.items.len(), "processing chunk");
        let outcome = process_chunk(&mut *guard.functor, chunk.items);
        let failed = outcome.is_err();
        if let Err(err) = &outcome {
            error!(worker_id, seq = chunk.seq, error = %format!("{err:#}"), "transform failed, worker exiting");
        }

        let result = ChunkResult {
            epoch: chunk.epoch,
            seq: chunk.seq,
            worker_id,
            outcome,
        };
        if result_sender.send(result).is_err() || failed {
            break;
        }
    }
}

/// Apply the functor to every item in order; the first failure aborts the chunk
fn process_chunk<F: Functor>(
    functor: &mut F,
    items: Vec<F::Input>,
) -> anyhow::Result<Vec<F::Output>> {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<Vec<F::Output>> {
        let mut outputs = Vec::with_capacity(items.len());
        for item in items {
            outputs.push(functor.process(item)?);
        }
        Ok(outputs)
    }));

    match attempt {
        Ok(outcome) => outcome,
        Err(payload) => Err(anyhow!("transform panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::types::Chunk;
    use crossbeam_channel::{bounded, unbounded};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default)]
    struct Counters {
        setups: AtomicUsize,
        teardowns: AtomicUsize,
    }

    struct Doubler {
        counters: Arc<Counters>,
        fail_on: Option<i64>,
    }

    impl Functor for Doubler {
        type Input = i64;
        type Output = i64;

        fn setup(&mut self) -> anyhow::Result<()> {
            self.counters.setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn process(&mut self, item: i64) -> anyhow::Result<i64> {
            if Some(item) == self.fail_on {
                anyhow::bail!("refusing {item}");
            }
            Ok(item * 2)
        }

        fn teardown(&mut self) {
            self.counters.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn chunk(seq: u64, items: Vec<i64>) -> Task<i64> {
        Task::Chunk(Chunk {
            epoch: 0,
            seq,
            items,
        })
    }

    fn spawn(
        functor: Doubler,
    ) -> (
        Sender<Task<i64>>,
        Receiver<ChunkResult<i64>>,
        Arc<ReadyLatch>,
        thread::JoinHandle<()>,
    ) {
        let (work_tx, work_rx) = bounded(4);
        let (result_tx, result_rx) = unbounded();
        let latch = Arc::new(ReadyLatch::new());
        let thread_latch = Arc::clone(&latch);
        let handle =
            thread::spawn(move || worker_thread(3, functor, work_rx, result_tx, thread_latch));
        (work_tx, result_rx, latch, handle)
    }

    #[test]
    fn test_worker_processes_chunks_and_stops() {
        let counters = Arc::new(Counters::default());
        let (work_tx, result_rx, latch, handle) = spawn(Doubler {
            counters: Arc::clone(&counters),
            fail_on: None,
        });

        assert_eq!(latch.wait(1), None);
        work_tx.send(chunk(0, vec![1, 2, 3])).unwrap();
        work_tx.send(chunk(1, vec![4])).unwrap();
        work_tx.send(Task::Stop).unwrap();
        handle.join().unwrap();

        let results: Vec<_> = result_rx.try_iter().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].seq, 0);
        assert_eq!(results[0].worker_id, 3);
        assert_eq!(results[0].outcome.as_ref().unwrap(), &vec![2, 4, 6]);
        assert_eq!(results[1].outcome.as_ref().unwrap(), &vec![8]);
        assert_eq!(counters.setups.load(Ordering::SeqCst), 1);
        assert_eq!(counters.teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transform_error_aborts_loop_but_tears_down() {
        let counters = Arc::new(Counters::default());
        let (work_tx, result_rx, _latch, handle) = spawn(Doubler {
            counters: Arc::clone(&counters),
            fail_on: Some(5),
        });

        work_tx.send(chunk(0, vec![4, 5, 6])).unwrap();
        // may race with the worker exiting
        let _ = work_tx.send(chunk(1, vec![7]));
        handle.join().unwrap();

        let results: Vec<_> = result_rx.try_iter().collect();
        assert_eq!(results.len(), 1);
        let err = results[0].outcome.as_ref().unwrap_err();
        assert!(err.to_string().contains("refusing 5"));
        assert_eq!(counters.teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_transform_is_reported() {
        let (work_tx, work_rx) = bounded(1);
        let (result_tx, result_rx) = unbounded();
        let latch = Arc::new(ReadyLatch::new());
        let worker = Worker::from_fn(|x: u32| -> anyhow::Result<u32> {
            if x == 2 {
                panic!("boom");
            }
            Ok(x)
        });
        let thread_latch = Arc::clone(&latch);
        let handle = thread::spawn(move || {
            worker_thread(0, worker.into_functor(), work_rx, result_tx, thread_latch)
        });

        work_tx
            .send(Task::Chunk(Chunk {
                epoch: 0,
                seq: 0,
                items: vec![1, 2],
            }))
            .unwrap();
        handle.join().unwrap();

        let result = result_rx.recv().unwrap();
        let err = result.outcome.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_disconnected_task_channel_ends_loop() {
        let counters = Arc::new(Counters::default());
        let (work_tx, _result_rx, _latch, handle) = spawn(Doubler {
            counters: Arc::clone(&counters),
            fail_on: None,
        });
        drop(work_tx);
        handle.join().unwrap();
        assert_eq!(counters.teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_ids() {
        let mut worker = from_map(|x: u8| x);
        assert_eq!(worker.id(), None);
        assert_eq!(worker.assign_id(4), 4);

        let mut fixed = from_map(|x: u8| x).with_id(9);
        assert_eq!(fixed.assign_id(0), 9);
    }
}
