//! Active Expiry
//!
//! A `get` on an elapsed key removes it on the spot, but a key that is never
//! read again would keep its slot and push live keys out through LRU eviction.
//! [`ExpirySweeper`] closes that gap: a [`PeriodicTask`] thread calls
//! [`CacheStore::sweep_expired`] once per interval (default: 60s) and logs how
//! many keys it removed.

use crate::storage::periodic::PeriodicTask;
use crate::storage::CacheStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval between sweeps (default: 60s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper thread is stopped and joined.
#[derive(Debug)]
pub struct ExpirySweeper {
    task: PeriodicTask,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper on its own thread.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use cachekv::storage::{CacheStore, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(CacheStore::with_capacity(1000)?);
    /// let sweeper = ExpirySweeper::start(store, ExpiryConfig::default())?;
    ///
    /// // Sweeper runs in the background...
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(store: Arc<CacheStore>, config: ExpiryConfig) -> std::io::Result<Self> {
        let task = PeriodicTask::spawn("cachekv-sweeper", config.interval, move || {
            let removed = store.sweep_expired();
            if removed > 0 {
                debug!(
                    expired = removed,
                    keys_remaining = store.len(),
                    "Expired keys cleaned up"
                );
            } else {
                trace!("Expiry sweep found nothing to remove");
            }
        })?;

        info!(
            interval_secs = config.interval.as_secs(),
            "Background expiry sweeper started"
        );

        Ok(Self { task })
    }

    /// Stops the expiry sweeper and waits for it to exit.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&mut self) {
        if self.task.is_running() {
            self.task.stop();
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
