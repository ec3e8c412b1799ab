//! # cachekv - A Bounded LRU Key-Value Cache Server
//!
//! cachekv is an in-memory key-value cache spoken to over plain-text TCP. It
//! holds a bounded number of keys, evicts the least recently used one when
//! full, expires keys by TTL, snapshots itself to disk and can sit in front of
//! a slower backing store.
//!
//! ## Features
//!
//! - **Bounded LRU**: at most `capacity` keys, one eviction per insert
//! - **TTL Support**: per-key time-to-live with lazy and background expiry
//! - **Snapshots**: periodic crash-safe dumps to a flat file, optional reload
//! - **Cache-aside / Write-through**: misses are served from a backing store
//! - **Two I/O Strategies**: readiness + worker pool, or a completion loop
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              cachekv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ Dispatcher  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │   State     │    │  Handler    │──> BackingStore  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   Text      │    │                 CacheStore                   │    │
//! │  │   Parser    │    │   Mutex { HashMap + RecencyList }            │    │
//! │  └─────────────┘    │   TaskQueue (deferred writes)                │    │
//! │                     └──────────────────────────────────────────────┘    │
//! │                            ▲                        ▲                   │
//! │                            │                        │                   │
//! │              ┌─────────────┴───────┐   ┌────────────┴────────────┐      │
//! │              │   ExpirySweeper     │   │  PersistenceScheduler   │      │
//! │              │  (timer thread)     │   │  (timer thread)         │      │
//! │              └─────────────────────┘   └─────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use cachekv::backing::NullBackingStore;
//! use cachekv::commands::{CommandHandler, DEFAULT_BACKFILL_TTL};
//! use cachekv::connection::{ConnectionStats, Dispatcher, DispatcherSettings};
//! use cachekv::storage::{CacheStore, ExpiryConfig, ExpirySweeper};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(CacheStore::with_capacity(200)?);
//!     let _sweeper = ExpirySweeper::start(Arc::clone(&store), ExpiryConfig::default())?;
//!
//!     let handler = Arc::new(CommandHandler::new(
//!         store,
//!         Arc::new(NullBackingStore),
//!         DEFAULT_BACKFILL_TTL,
//!     ));
//!     let stats = Arc::new(ConnectionStats::new());
//!     let dispatcher = Dispatcher::bind(&DispatcherSettings::default(), handler, stats)?;
//!
//!     let (_tx, rx) = tokio::sync::watch::channel(false);
//!     dispatcher.run(rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `set <key> <value> [ttlSeconds]`
//! - `get <key>`
//! - `del <key>`
//!
//! ## Module Overview
//!
//! - [`protocol`]: text command parser and reply types
//! - [`storage`]: the LRU/TTL store, its write queue, sweeper and snapshots
//! - [`commands`]: command execution, write-through and cache-aside
//! - [`backing`]: the backing store capability
//! - [`connection`]: listener, connection state and the two dispatchers
//! - [`config`]: defaults, TOML file and validation
//!
//! ## Design Highlights
//!
//! ### One Lock
//!
//! The map and the recency list change together on every `get` and `set`, so
//! a single mutex guards both. Nothing holds it across blocking I/O; snapshots
//! copy the entries under the lock and write the file after releasing it.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: a `get` on an elapsed key removes it and reports `EXPIRED`
//! 2. **Active**: a background thread periodically scans for expired keys
//!
//! This ensures memory is reclaimed even for keys that are never accessed again.

pub mod backing;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use backing::{BackingStore, MemoryBackingStore, NullBackingStore};
pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{ConnectionStats, DispatchStrategy, Dispatcher, RequestHandler};
pub use protocol::{parse_command, Command, ParseError, Reply};
pub use storage::{CacheStore, ExpiryConfig, ExpirySweeper, GetResult, SetResult};

/// The default port cachekv listens on
pub const DEFAULT_PORT: u16 = 2000;

/// The default host cachekv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of cachekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
