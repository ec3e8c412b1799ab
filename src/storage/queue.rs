//! Deferred Write Queue
//!
//! A FIFO of boxed tasks drained by one dedicated worker thread. The cache
//! store uses it for fire-and-forget writes: the caller enqueues and returns
//! immediately, the worker runs the `set` later.
//!
//! ## Locking
//!
//! The queue has its own mutex/condvar pair. It is never held while a task
//! runs, and it is independent of the store lock, so enqueueing never waits on
//! store contention.
//!
//! ## Shutdown
//!
//! [`TaskQueue::shutdown`] sets a flag under the queue lock, wakes the worker and
//! joins it. The worker keeps draining until the queue is empty, so tasks that
//! were accepted before shutdown still run. Enqueueing after shutdown returns
//! [`QueueClosed`].

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Returned when a task is submitted after shutdown has begun.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("task queue is shut down")]
pub struct QueueClosed;

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    ready: Condvar,
}

/// Single-consumer task queue with a dedicated worker thread.
pub struct TaskQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TaskQueue")
            .field("pending", &state.tasks.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

impl TaskQueue {
    /// Creates the queue and starts its worker thread.
    ///
    /// # Errors
    ///
    /// Fails only if the OS refuses to spawn the thread.
    pub fn start(name: &str) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(worker_shared))?;

        debug!(thread = name, "Task queue worker started");

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Appends a task and wakes the worker. Never blocks on task execution.
    pub fn enqueue(&self, task: Task) -> Result<(), QueueClosed> {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return Err(QueueClosed);
            }
            state.tasks.push_back(task);
            trace!(pending = state.tasks.len(), "Task enqueued");
        }
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    /// Stops accepting tasks, drains the queue and joins the worker.
    ///
    /// Safe to call more than once. When called from the worker thread itself
    /// (a task dropping the last owner of the queue) the join is skipped.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
        }
        self.shared.ready.notify_all();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Task queue worker panicked");
            } else {
                debug!("Task queue worker stopped");
            }
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut state = shared.state.lock();
            while state.tasks.is_empty() && !state.shutdown {
                shared.ready.wait(&mut state);
            }
            match state.tasks.pop_front() {
                Some(task) => task,
                // Shut down and fully drained
                None => return,
            }
        };

        task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_runs_tasks_in_fifo_order() {
        let queue = TaskQueue::start("test-queue").unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            queue
                .enqueue(Box::new(move || tx.send(i).unwrap()))
                .unwrap();
        }

        let order: Vec<i32> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shutdown_drains_pending_tasks() {
        let queue = TaskQueue::start("test-queue").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            queue
                .enqueue(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        queue.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_enqueue_after_shutdown_is_rejected() {
        let queue = TaskQueue::start("test-queue").unwrap();
        queue.shutdown();

        let result = queue.enqueue(Box::new(|| {}));
        assert_eq!(result, Err(QueueClosed));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let queue = TaskQueue::start("test-queue").unwrap();
        queue.shutdown();
        queue.shutdown();
    }

    #[test]
    fn test_enqueue_does_not_wait_for_slow_task() {
        let queue = TaskQueue::start("test-queue").unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        queue
            .enqueue(Box::new(move || {
                let _ = release_rx.recv_timeout(Duration::from_secs(2));
            }))
            .unwrap();

        // Worker is busy; enqueueing still returns right away
        let start = std::time::Instant::now();
        queue.enqueue(Box::new(|| {})).unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));

        release_tx.send(()).unwrap();
        queue.shutdown();
    }
}
