//! Fixed-size worker pool.
//!
//! A set of long-lived threads pulling boxed closures from one shared FIFO
//! queue. The pool knows nothing about sockets or chat; the reactor hands it
//! accept and read tasks, but any `FnOnce() + Send` will do.
//!
//! ## Lifecycle
//! - [`WorkerPool::new`] spawns every worker up front
//! - [`WorkerPool::submit`] enqueues a task, or fails once shutdown has begun
//! - [`WorkerPool::shutdown`] stops intake, lets queued tasks finish, joins
//!   the workers

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error, warn};

/// Unit of work executed by a worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors returned by the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

struct QueueState {
    tasks: VecDeque<Task>,
    accepting: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed set of worker threads sharing one task queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawns `size` workers named `{name}-{index}`.
    ///
    /// If any spawn fails, the workers already started are shut down before
    /// the error is returned.
    pub fn new(size: usize, name: &str) -> Result<Self, PoolError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                accepting: true,
            }),
            available: Condvar::new(),
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(size)),
            size,
        };

        for index in 0..size {
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&shared));

            match spawned {
                Ok(handle) => pool.lock_workers().push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        debug!(size, "Worker pool started");
        Ok(pool)
    }

    /// Queues `task` to run on the next free worker.
    ///
    /// # Errors
    ///
    /// `PoolError::ShutDown` once [`shutdown`](Self::shutdown) has been
    /// called; the task is returned to nobody and never runs, so callers must
    /// handle the error.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.lock();
        if !state.accepting {
            return Err(PoolError::ShutDown);
        }
        state.tasks.push_back(Box::new(task));
        drop(state);

        self.shared.available.notify_one();
        Ok(())
    }

    /// Stops intake, drains the queue and joins every worker.
    ///
    /// Idempotent. Must not be called from a worker thread.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.accepting = false;
        }
        self.shared.available.notify_all();

        let workers: Vec<JoinHandle<()>> = self.lock_workers().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!("Worker thread exited abnormally");
            }
        }
    }

    /// Number of workers the pool was started with.
    pub fn size(&self) -> usize {
        self.size
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    #[cfg(test)]
    fn is_accepting(&self) -> bool {
        self.shared.lock().accepting
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.lock();
            loop {
                if let Some(task) = state.tasks.pop_front() {
                    break Some(task);
                }
                if !state.accepting {
                    break None;
                }
                state = shared
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let Some(task) = task else {
            return;
        };

        // A panicking task must not take its worker down with it.
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!(
                worker = thread::current().name().unwrap_or("worker"),
                "Task panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_runs_submitted_tasks() {
        let pool = WorkerPool::new(2, "test").unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..10 {
            let tx = tx.clone();
            pool.submit(move || tx.send(i).unwrap()).unwrap();
        }

        let mut got: Vec<i32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        got.sort_unstable();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool = WorkerPool::new(1, "test").unwrap();
        pool.shutdown();

        assert!(!pool.is_accepting());
        assert!(matches!(pool.submit(|| {}), Err(PoolError::ShutDown)));
    }

    #[test]
    fn test_shutdown_drains_queued_tasks() {
        let pool = WorkerPool::new(1, "test").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();

        // Hold the only worker so the rest pile up in the queue.
        pool.submit(move || {
            let _ = gate_rx.recv_timeout(Duration::from_secs(5));
        })
        .unwrap();

        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        gate_tx.send(()).unwrap();
        pool.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = WorkerPool::new(3, "test").unwrap();
        pool.shutdown();
        pool.shutdown();
        assert_eq!(pool.size(), 3);
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let pool = WorkerPool::new(1, "test").unwrap();
        let (tx, rx) = mpsc::channel();

        pool.submit(|| panic!("boom")).unwrap();
        pool.submit(move || tx.send("still here").unwrap()).unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            "still here"
        );
    }

    #[test]
    fn test_tasks_run_concurrently() {
        let pool = WorkerPool::new(2, "test").unwrap();
        let (tx_a, rx_a) = mpsc::channel::<()>();
        let (tx_b, rx_b) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        // Each task waits for the other; only completes if both run at once.
        let done_a = done_tx.clone();
        pool.submit(move || {
            tx_b.send(()).unwrap();
            rx_a.recv_timeout(Duration::from_secs(5)).unwrap();
            done_a.send(()).unwrap();
        })
        .unwrap();
        pool.submit(move || {
            tx_a.send(()).unwrap();
            rx_b.recv_timeout(Duration::from_secs(5)).unwrap();
            done_tx.send(()).unwrap();
        })
        .unwrap();

        for _ in 0..2 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
    }
}
