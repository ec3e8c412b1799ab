//! Command Handler Module
//!
//! Executes parsed commands against the cache and its backing store.
//!
//! ## Read and Write Paths
//!
//! ```text
//!   set ──> CacheStore::set ──(fresh key)──> BackingStore::upsert
//!
//!   get ──> CacheStore::get ── Hit ─────────> value
//!                          ├── Expired ─────> EXPIRED
//!                          └── Missing ──> BackingStore::lookup
//!                                           ├── Some ──> fill_async(back-fill) + value
//!                                           └── None ──> NOT_FOUND
//!
//!   del ──> CacheStore::delete ──(removed)──> BackingStore::delete
//! ```
//!
//! A back-fill is queued as an insert-if-absent, so a `set` that reaches the
//! cache first is never replaced by the older backing value.
//!
//! Backing store failures never change the reply. A failed lookup is a miss,
//! a failed upsert or delete leaves the cache as it is; both are logged.

use crate::backing::BackingStore;
use crate::connection::RequestHandler;
use crate::protocol::{parse_command, Command, Reply};
use crate::storage::{CacheStore, GetResult};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// TTL given to values copied into the cache from the backing store.
pub const DEFAULT_BACKFILL_TTL: Duration = Duration::from_secs(3600);

/// Turns command lines into replies.
#[derive(Clone)]
pub struct CommandHandler {
    /// The cache
    store: Arc<CacheStore>,
    /// The slower store behind it
    backing: Arc<dyn BackingStore>,
    /// TTL for cache-aside back-fills
    backfill_ttl: Duration,
}

impl CommandHandler {
    /// Creates a new command handler.
    pub fn new(
        store: Arc<CacheStore>,
        backing: Arc<dyn BackingStore>,
        backfill_ttl: Duration,
    ) -> Self {
        Self {
            store,
            backing,
            backfill_ttl,
        }
    }

    /// Parses and executes one command line.
    pub fn execute(&self, input: &[u8]) -> Reply {
        match parse_command(input) {
            Ok(command) => self.execute_command(command),
            Err(e) => {
                debug!(error = %e, "Rejected command");
                Reply::error(e.to_string())
            }
        }
    }

    /// Executes an already parsed command.
    pub fn execute_command(&self, command: Command) -> Reply {
        debug!(command = command.name(), key = command.key(), "Executing");
        match command {
            Command::Set { key, value, ttl } => self.cmd_set(key, value, ttl),
            Command::Get { key } => self.cmd_get(key),
            Command::Del { key } => self.cmd_del(&key),
        }
    }

    fn cmd_set(&self, key: String, value: Bytes, ttl: Duration) -> Reply {
        let result = self.store.set(key.clone(), value.clone(), ttl);

        if !result.overwritten {
            if let Err(e) = self.backing.upsert(&key, value) {
                warn!(key = %key, error = %e, "Write-through failed");
            }
        }

        Reply::Ok {
            overwritten: result.overwritten,
            evicted: result.evicted,
        }
    }

    fn cmd_get(&self, key: String) -> Reply {
        match self.store.get(&key) {
            GetResult::Hit(value) => Reply::Value(value),
            GetResult::Expired => Reply::Expired,
            GetResult::Missing => self.read_through(key),
        }
    }

    /// Serves a cache miss from the backing store and back-fills the cache.
    fn read_through(&self, key: String) -> Reply {
        let value = match self.backing.lookup(&key) {
            Ok(Some(value)) => value,
            Ok(None) => return Reply::NotFound,
            Err(e) => {
                warn!(key = %key, error = %e, "Backing lookup failed, treating as miss");
                return Reply::NotFound;
            }
        };

        debug!(key = %key, "Back-filling from backing store");
        if let Err(e) = self
            .store
            .fill_async(key.clone(), value.clone(), self.backfill_ttl)
        {
            warn!(key = %key, error = %e, "Back-fill dropped");
        }
        Reply::Value(value)
    }

    fn cmd_del(&self, key: &str) -> Reply {
        if !self.store.delete(key) {
            return Reply::NotFound;
        }

        if let Err(e) = self.backing.delete(key) {
            warn!(key = %key, error = %e, "Backing delete failed");
        }
        Reply::ok()
    }
}

impl RequestHandler for CommandHandler {
    fn handle(&self, request: &[u8]) -> Bytes {
        self.execute(request).serialize()
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("store", &self.store)
            .field("backfill_ttl", &self.backfill_ttl)
            .finish_non_exhaustive()
    }
}
