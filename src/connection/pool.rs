//! Request Worker Pool
//!
//! A fixed set of OS threads that run the [`RequestHandler`] off the I/O
//! thread. Requests travel to the workers over a shared channel; each reply
//! comes back on its own oneshot channel, so the connection task that asked
//! is the only one woken.
//!
//! ```text
//!  connection task ──Job{request, reply_tx}──> [ mpsc ] ──> worker 0..N
//!        ▲                                                     │
//!        └────────────────────── reply (oneshot) ──────────────┘
//! ```

use super::{ConnectionError, RequestHandler};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, trace};

struct Job {
    request: Bytes,
    reply: oneshot::Sender<Bytes>,
}

/// A fixed-size pool of handler threads.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts `size` worker threads sharing `handler`.
    pub fn new(size: usize, handler: Arc<dyn RequestHandler>) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = Arc::clone(&receiver);
            let handler = Arc::clone(&handler);
            let worker = thread::Builder::new()
                .name(format!("cachekv-worker-{}", id))
                .spawn(move || worker_loop(id, receiver, handler))?;
            workers.push(worker);
        }

        debug!(workers = size, "Worker pool started");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Runs `request` on a worker and waits for its reply.
    pub async fn process(&self, request: Bytes) -> Result<Bytes, ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let sender = self.sender.lock();
            let sender = sender.as_ref().ok_or(ConnectionError::PoolClosed)?;
            sender
                .send(Job {
                    request,
                    reply: reply_tx,
                })
                .map_err(|_| ConnectionError::PoolClosed)?;
        }
        reply_rx.await.map_err(|_| ConnectionError::PoolClosed)
    }

    pub fn size(&self) -> usize {
        self.workers.lock().len()
    }

    /// Closes the job channel and joins every worker. Jobs already queued
    /// are still run.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size())
            .finish()
    }
}

fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    handler: Arc<dyn RequestHandler>,
) {
    loop {
        let job = receiver.lock().recv();
        match job {
            Ok(job) => {
                trace!(worker = id, bytes = job.request.len(), "Handling request");
                let reply = handler.handle(&job.request);
                // The connection may have gone away while we worked.
                let _ = job.reply.send(reply);
            }
            Err(_) => break,
        }
    }
    trace!(worker = id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl RequestHandler for Upper {
        fn handle(&self, request: &[u8]) -> Bytes {
            Bytes::from(request.to_ascii_uppercase())
        }
    }

    #[tokio::test]
    async fn test_process_runs_handler() {
        let pool = WorkerPool::new(2, Arc::new(Upper)).unwrap();
        assert_eq!(pool.size(), 2);

        let reply = pool.process(Bytes::from("hello")).await.unwrap();
        assert_eq!(reply, Bytes::from("HELLO"));
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let pool = Arc::new(WorkerPool::new(3, Arc::new(Upper)).unwrap());

        let mut tasks = Vec::new();
        for i in 0..20 {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move {
                pool.process(Bytes::from(format!("req{}", i))).await
            }));
        }

        for (i, task) in tasks.into_iter().enumerate() {
            let reply = task.await.unwrap().unwrap();
            assert_eq!(reply, Bytes::from(format!("REQ{}", i)));
        }
    }

    #[tokio::test]
    async fn test_process_after_shutdown() {
        let pool = WorkerPool::new(1, Arc::new(Upper)).unwrap();
        pool.shutdown();

        assert_eq!(pool.size(), 0);
        let result = pool.process(Bytes::from("late")).await;
        assert!(matches!(result, Err(ConnectionError::PoolClosed)));
    }
}
