//! Asynchronous compute queues and completion tokens.
//!
//! Analysis jobs are submitted to a [`ComputeQueue`] and answered with a
//! [`Completion`] token. In [`ComputeMode::Overlapped`] each queue is a
//! single-threaded rayon pool, so jobs on one queue run in submission order
//! while the orchestrator keeps ingesting frames. A job on one queue may wait
//! on tokens produced by another queue. Jobs never wait on their own queue.
//!
//! In [`ComputeMode::Synchronous`] jobs run inline and the returned token is
//! already complete.

use crate::error::{AfsError, Result};
use parking_lot::{Condvar, Mutex};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// How analysis work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComputeMode {
    /// Run every job on the calling thread.
    #[default]
    Synchronous,
    /// Run jobs on background queues, one frame ahead of consumption.
    Overlapped,
}

impl ComputeMode {
    /// Extra frames of lookahead needed before the first emission.
    pub fn extra_lookahead(&self) -> i64 {
        match self {
            ComputeMode::Synchronous => 0,
            ComputeMode::Overlapped => 1,
        }
    }
}

struct Slot<T> {
    value: Mutex<Option<Result<T>>>,
    ready: Condvar,
}

/// Handle to the result of a submitted job.
///
/// Cloning the token shares the same result.
pub struct Completion<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl<T> Completion<T> {
    fn pending() -> Self {
        Self {
            slot: Arc::new(Slot {
                value: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// A token that is already complete.
    pub fn ready(result: Result<T>) -> Self {
        let token = Self::pending();
        token.complete(result);
        token
    }

    fn complete(&self, result: Result<T>) {
        let mut value = self.slot.value.lock();
        *value = Some(result);
        self.slot.ready.notify_all();
    }

    /// Whether the job has finished.
    pub fn is_ready(&self) -> bool {
        self.slot.value.lock().is_some()
    }
}

impl<T: Clone> Completion<T> {
    /// Block until the job has finished and return its result.
    pub fn wait(&self) -> Result<T> {
        let mut value = self.slot.value.lock();
        loop {
            if let Some(result) = value.as_ref() {
                return result.clone();
            }
            self.slot.ready.wait(&mut value);
        }
    }
}

/// A FIFO job queue.
pub struct ComputeQueue {
    name: &'static str,
    pool: Option<ThreadPool>,
}

impl ComputeQueue {
    /// Create a queue for `mode`.
    pub fn new(name: &'static str, mode: ComputeMode) -> Result<Self> {
        let pool = match mode {
            ComputeMode::Synchronous => None,
            ComputeMode::Overlapped => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(1)
                    .thread_name(move |idx| format!("afs-{}-{}", name, idx))
                    .build()
                    .map_err(|e| AfsError::compute(format!("{} queue: {}", name, e)))?,
            ),
        };
        Ok(Self { name, pool })
    }

    /// Queue name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Mode the queue runs in.
    pub fn mode(&self) -> ComputeMode {
        if self.pool.is_some() {
            ComputeMode::Overlapped
        } else {
            ComputeMode::Synchronous
        }
    }

    /// Submit `job` and return its completion token.
    pub fn submit<T, F>(&self, job: F) -> Completion<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let name = self.name;
        let run = move || {
            catch_unwind(AssertUnwindSafe(job))
                .unwrap_or_else(|_| Err(AfsError::compute(format!("{} job panicked", name))))
        };
        match &self.pool {
            None => Completion::ready(run()),
            Some(pool) => {
                let token = Completion::pending();
                let done = token.clone();
                pool.spawn_fifo(move || done.complete(run()));
                token
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_synchronous_is_ready_immediately() {
        let queue = ComputeQueue::new("scan", ComputeMode::Synchronous).unwrap();
        let token = queue.submit(|| Ok(21 * 2));
        assert!(token.is_ready());
        assert_eq!(token.wait().unwrap(), 42);
    }

    #[test]
    fn test_overlapped_runs_in_order() {
        let queue = ComputeQueue::new("scan", ComputeMode::Overlapped).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let tokens: Vec<_> = (0..8)
            .map(|i| {
                let counter = Arc::clone(&counter);
                queue.submit(move || Ok((i, counter.fetch_add(1, Ordering::SeqCst))))
            })
            .collect();
        for (i, token) in tokens.iter().enumerate() {
            let (job, order) = token.wait().unwrap();
            assert_eq!(job, i);
            assert_eq!(order, i);
        }
    }

    #[test]
    fn test_cross_queue_dependency() {
        let a = ComputeQueue::new("scan", ComputeMode::Overlapped).unwrap();
        let b = ComputeQueue::new("merge", ComputeMode::Overlapped).unwrap();
        let first = a.submit(|| Ok(5));
        let dep = first.clone();
        let second = b.submit(move || Ok(dep.wait()? * 3));
        assert_eq!(second.wait().unwrap(), 15);
        assert_eq!(first.wait().unwrap(), 5);
    }

    #[test]
    fn test_errors_and_panics_reach_waiter() {
        let queue = ComputeQueue::new("merge", ComputeMode::Overlapped).unwrap();
        let failed: Completion<u32> = queue.submit(|| Err(AfsError::compute("boom")));
        assert_eq!(failed.wait(), Err(AfsError::compute("boom")));

        let panicked: Completion<u32> = queue.submit(|| panic!("worker died"));
        assert!(matches!(panicked.wait(), Err(AfsError::Compute { .. })));
    }

    #[test]
    fn test_mode_lookahead() {
        assert_eq!(ComputeMode::Synchronous.extra_lookahead(), 0);
        assert_eq!(ComputeMode::Overlapped.extra_lookahead(), 1);
        let queue = ComputeQueue::new("scan", ComputeMode::Overlapped).unwrap();
        assert_eq!(queue.mode(), ComputeMode::Overlapped);
        assert_eq!(queue.name(), "scan");
    }
}
