//! Fixed-size worker pool with a condvar-guarded FIFO task queue.
//!
//! Each polling round submits one collection task per collector and waits
//! for all of them before rendering. Handles support deadline waits so one
//! stalled read cannot block an entire round, and shutdown can either drain
//! the queue or cancel tasks that have not started yet.

use std::collections::VecDeque;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// How `shutdown` treats tasks still sitting in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Complete every queued task before the workers exit.
    Drain,
    /// Resolve queued-but-unstarted tasks as `TaskError::Cancelled`.
    /// Tasks already running always finish.
    CancelPending,
}

/// A task failed to produce its result.
#[derive(Debug)]
pub enum TaskError {
    /// The task was dropped from the queue before a worker picked it up.
    Cancelled,
    /// The task panicked; the payload message is preserved.
    Panicked(String),
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Cancelled => write!(f, "task cancelled before execution"),
            TaskError::Panicked(msg) => write!(f, "task panicked: {}", msg),
        }
    }
}

impl std::error::Error for TaskError {}

/// The pool has been shut down and accepts no new tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

impl std::fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker pool is shut down")
    }
}

impl std::error::Error for PoolClosed {}

enum TaskState<R> {
    Pending,
    Done(Result<R, TaskError>),
}

struct TaskShared<R> {
    state: Mutex<TaskState<R>>,
    done: Condvar,
}

/// Handle to a submitted task, resolving to its result or a propagated
/// fault.
pub struct TaskHandle<R> {
    shared: Arc<TaskShared<R>>,
}

impl<R> TaskHandle<R> {
    /// Blocks until the task completes.
    pub fn wait(self) -> Result<R, TaskError> {
        let mut state = self.shared.state.lock().expect("task lock poisoned");
        loop {
            if let TaskState::Done(result) = mem::replace(&mut *state, TaskState::Pending) {
                return result;
            }
            state = self.shared.done.wait(state).expect("task lock poisoned");
        }
    }

    /// Waits up to `timeout` for the task to complete.
    ///
    /// Returns the handle back on timeout; the task keeps running and the
    /// handle stays valid for a later wait.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Result<R, TaskError>, Self> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().expect("task lock poisoned");
        loop {
            if let TaskState::Done(result) = mem::replace(&mut *state, TaskState::Pending) {
                drop(state);
                return Ok(result);
            }
            let now = Instant::now();
            if now >= deadline {
                drop(state);
                return Err(self);
            }
            let (guard, _) = self
                .shared
                .done
                .wait_timeout(state, deadline - now)
                .expect("task lock poisoned");
            state = guard;
        }
    }

    /// Non-blocking completion check.
    pub fn try_wait(self) -> Result<Result<R, TaskError>, Self> {
        self.wait_timeout(Duration::ZERO)
    }
}

/// Marks the task cancelled if the job is dropped without running, so a
/// handle never waits forever on a task that left the queue.
struct CompletionGuard<R> {
    shared: Arc<TaskShared<R>>,
    completed: bool,
}

impl<R> CompletionGuard<R> {
    fn complete(mut self, result: Result<R, TaskError>) {
        self.finish(result);
        self.completed = true;
    }

    fn finish(&self, result: Result<R, TaskError>) {
        *self.shared.state.lock().expect("task lock poisoned") = TaskState::Done(result);
        self.shared.done.notify_all();
    }
}

impl<R> Drop for CompletionGuard<R> {
    fn drop(&mut self) {
        if !self.completed {
            self.finish(Err(TaskError::Cancelled));
        }
    }
}

struct QueueState {
    jobs: VecDeque<Job>,
    closed: bool,
    mode: ShutdownMode,
}

struct Inner {
    queue: Mutex<QueueState>,
    available: Condvar,
}

/// Fixed-size pool of worker threads over one FIFO queue.
pub struct WorkerPool {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns a pool with `num_workers` threads.
    ///
    /// # Panics
    /// Panics if `num_workers` is zero.
    pub fn new(num_workers: usize) -> Self {
        assert!(num_workers > 0, "worker pool requires at least one thread");

        let inner = Arc::new(Inner {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                closed: false,
                mode: ShutdownMode::Drain,
            }),
            available: Condvar::new(),
        });

        let workers = (0..num_workers)
            .map(|i| {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name(format!("sysmon-worker-{}", i))
                    .spawn(move || worker_loop(inner))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { inner, workers }
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues a task, returning a handle to its eventual result.
    ///
    /// A panic inside the task resolves the handle to
    /// `TaskError::Panicked` instead of tearing the worker down.
    pub fn submit<R, F>(&self, task: F) -> Result<TaskHandle<R>, PoolClosed>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let shared = Arc::new(TaskShared {
            state: Mutex::new(TaskState::Pending),
            done: Condvar::new(),
        });
        let guard = CompletionGuard {
            shared: Arc::clone(&shared),
            completed: false,
        };

        let job: Job = Box::new(move || {
            match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(value) => guard.complete(Ok(value)),
                Err(payload) => guard.complete(Err(TaskError::Panicked(panic_message(&payload)))),
            }
        });

        {
            let mut queue = self.inner.queue.lock().expect("pool lock poisoned");
            if queue.closed {
                return Err(PoolClosed);
            }
            queue.jobs.push_back(job);
        }
        self.inner.available.notify_one();

        Ok(TaskHandle { shared })
    }

    /// Stops accepting tasks, resolves the queue per `mode`, then joins all
    /// workers. Running tasks always complete. Idempotent.
    pub fn shutdown(&mut self, mode: ShutdownMode) {
        {
            let mut queue = self.inner.queue.lock().expect("pool lock poisoned");
            queue.closed = true;
            queue.mode = mode;
        }
        self.inner.available.notify_all();

        for worker in self.workers.drain(..) {
            // A worker that panicked outside catch_unwind is already
            // accounted for by its tasks' completion guards.
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown(ShutdownMode::CancelPending);
        }
    }
}

fn worker_loop(inner: Arc<Inner>) {
    loop {
        let job = {
            let mut queue = inner.queue.lock().expect("pool lock poisoned");
            loop {
                if queue.closed && queue.mode == ShutdownMode::CancelPending {
                    let pending: Vec<Job> = queue.jobs.drain(..).collect();
                    drop(queue);
                    // Dropping the jobs resolves their handles as Cancelled.
                    drop(pending);
                    return;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.closed {
                    return;
                }
                queue = inner.available.wait(queue).expect("pool lock poisoned");
            }
        };
        job();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
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
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn test_submit_returns_value() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit(|| 21 * 2).unwrap();
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    #[should_panic(expected = "at least one thread")]
    fn test_zero_workers_rejected() {
        let _ = WorkerPool::new(0);
    }

    #[test]
    fn test_wait_all_barrier() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    thread::sleep(Duration::from_millis(5));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        for handle in handles {
            handle.wait().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_fifo_order_on_single_worker() {
        let pool = WorkerPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let order = Arc::clone(&order);
                pool.submit(move || order.lock().unwrap().push(i)).unwrap()
            })
            .collect();
        for handle in handles {
            handle.wait().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_panic_propagates_as_fault() {
        let pool = WorkerPool::new(1);
        let handle = pool.submit(|| -> u32 { panic!("collector exploded") }).unwrap();

        match handle.wait() {
            Err(TaskError::Panicked(msg)) => assert!(msg.contains("collector exploded")),
            other => panic!("expected panic fault, got {:?}", other.map(|_| ())),
        }

        // The worker survives and keeps serving tasks.
        let handle = pool.submit(|| 7).unwrap();
        assert_eq!(handle.wait().unwrap(), 7);
    }

    #[test]
    fn test_wait_timeout_then_wait() {
        let pool = WorkerPool::new(1);
        let handle = pool
            .submit(|| {
                thread::sleep(Duration::from_millis(100));
                "slow"
            })
            .unwrap();

        // Deadline expires while the task is still running.
        let handle = match handle.wait_timeout(Duration::from_millis(5)) {
            Err(handle) => handle,
            Ok(_) => panic!("task should not have finished yet"),
        };

        // The handle stays valid and resolves once the task completes.
        assert_eq!(handle.wait().unwrap(), "slow");
    }

    #[test]
    fn test_shutdown_drain_completes_queued_tasks() {
        let mut pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    thread::sleep(Duration::from_millis(10));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        pool.shutdown(ShutdownMode::Drain);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        for handle in handles {
            assert!(handle.wait().is_ok());
        }
    }

    #[test]
    fn test_shutdown_cancels_pending_tasks() {
        let mut pool = WorkerPool::new(1);

        // Occupy the single worker so the rest stay queued.
        let started = Arc::new(AtomicBool::new(false));
        let running = {
            let started = Arc::clone(&started);
            pool.submit(move || {
                started.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
            })
            .unwrap()
        };
        let queued: Vec<_> = (0..3)
            .map(|i| pool.submit(move || i).unwrap())
            .collect();

        // Only shut down once the first task is in flight, so it is the one
        // that completes while the queued ones get cancelled.
        while !started.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        pool.shutdown(ShutdownMode::CancelPending);

        // The in-flight task completed; the queued ones were cancelled.
        assert!(running.wait().is_ok());
        for handle in queued {
            assert!(matches!(handle.wait(), Err(TaskError::Cancelled)));
        }
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let mut pool = WorkerPool::new(1);
        pool.shutdown(ShutdownMode::Drain);
        assert!(matches!(pool.submit(|| ()), Err(PoolClosed)));
    }

    #[test]
    fn test_drop_cancels_pending() {
        let pool = WorkerPool::new(1);
        let _running = pool
            .submit(|| thread::sleep(Duration::from_millis(50)))
            .unwrap();
        let queued = pool.submit(|| 1).unwrap();

        drop(pool);
        assert!(matches!(queued.wait(), Err(TaskError::Cancelled)));
    }
}
