//! Command Handler Module
//!
//! This module implements the command processing layer for cachekv.
//! It receives raw command lines, executes them against the cache and the
//! backing store, and returns the reply to send.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Text Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Write-through│
//! │  - Cache-aside  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌─────────────────┐
//! │   CacheStore    │      │  BackingStore   │
//! └─────────────────┘      └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `set <key> <value> [ttlSeconds]`
//! - `get <key>`
//! - `del <key>`

pub mod handler;

// Re-export the main command handler
pub use handler::{CommandHandler, DEFAULT_BACKFILL_TTL};
