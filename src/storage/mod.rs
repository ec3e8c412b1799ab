//! Storage Engine Module
//!
//! This module provides the cache engine for cachekv: a bounded LRU store with
//! TTL support, its deferred write queue, snapshot persistence and the
//! background threads that keep it tidy.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CacheStore                           │
//! │   Mutex { HashMap<String, Entry> + RecencyList }            │
//! │   TaskQueue ──> writer thread (set_async, fill_async)       │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                                   ▲
//!          │ sweep_expired()                   │ snapshot() / restore()
//!  ┌───────┴──────────┐              ┌─────────┴──────────────┐
//!  │  ExpirySweeper   │              │  PersistenceScheduler  │
//!  │ (PeriodicTask)   │              │  (PeriodicTask)        │
//!  └──────────────────┘              └────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Bounded**: inserting past capacity evicts the least recently used key
//! - **TTL Support**: keys can have a time-to-live, zero means forever
//! - **Lazy Expiry**: expired keys are removed and reported on access
//! - **Active Expiry**: a background sweeper removes keys nobody reads
//! - **Snapshots**: periodic crash-safe dumps to a flat file, optional reload
//!
//! ## Example
//!
//! ```
//! use cachekv::storage::{CacheStore, GetResult};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let store = CacheStore::with_capacity(100).unwrap();
//!
//! store.set("name", Bytes::from("cachekv"), Duration::ZERO);
//! assert_eq!(store.get("name"), GetResult::Hit(Bytes::from("cachekv")));
//!
//! store.set("session", Bytes::from("token123"), Duration::from_secs(3600));
//! assert!(store.delete("session"));
//! ```

pub mod engine;
pub mod expiry;
pub mod lru;
pub mod periodic;
pub mod persistence;
pub mod queue;


// Re-export commonly used types
pub use engine::{
    CacheStore, GetResult, SetCallback, SetResult, SnapshotRecord, StorageStats,
    DEFAULT_CAPACITY,
};
pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use periodic::PeriodicTask;
pub use persistence::{
    load_from_file, persist_to_file, LoadSummary, PersistenceError, PersistenceScheduler,
};
pub use queue::{QueueClosed, TaskQueue};
