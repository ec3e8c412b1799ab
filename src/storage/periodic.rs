//! Cancellable Fixed-Interval Background Threads
//!
//! Both the expiry sweeper and the snapshot scheduler run on their own OS
//! thread so that a full-store pass or a file write never lands on the
//! dispatcher thread. Each thread waits on a stop channel with a timeout equal
//! to the interval: a timeout means "tick", a message or a dropped sender means
//! "exit". [`PeriodicTask::stop`] signals and joins, so nothing outlives an
//! orderly shutdown.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Handle to a running periodic thread.
///
/// Dropping the handle stops and joins the thread.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawns a thread that calls `tick` every `interval` until stopped.
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tick(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        debug!(task = name, interval_ms = interval.as_millis() as u64, "Periodic task started");

        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signals the thread and waits for the current tick, if any, to finish.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(task = %self.name, "Periodic task panicked");
            } else {
                debug!(task = %self.name, "Periodic task stopped");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
