//! Backing Store Capability
//!
//! The command handler falls back to a slower persistent store on a cache miss
//! (cache-aside) and propagates fresh writes and deletes to it
//! (write-through). The cache only needs three operations from that store, so
//! it is modelled as the [`BackingStore`] trait.
//!
//! Failures are reported as [`BackingError`] and never fail the cache reply:
//! the handler logs them and carries on.
//!
//! Two implementations ship with the crate:
//! - [`NullBackingStore`]: no backing store at all; every lookup misses.
//! - [`MemoryBackingStore`]: an in-process map, useful for tests and demos.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

/// Errors reported by a backing store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackingError {
    /// The store could not be reached
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
}

/// The persistent store behind the cache.
pub trait BackingStore: Send + Sync {
    /// Fetches a value, `Ok(None)` when the key is unknown.
    fn lookup(&self, key: &str) -> Result<Option<Bytes>, BackingError>;

    /// Inserts or replaces a value.
    fn upsert(&self, key: &str, value: Bytes) -> Result<(), BackingError>;

    /// Removes a value. Removing an unknown key is not an error.
    fn delete(&self, key: &str) -> Result<(), BackingError>;
}

/// A backing store that holds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackingStore;

impl BackingStore for NullBackingStore {
    fn lookup(&self, _key: &str) -> Result<Option<Bytes>, BackingError> {
        Ok(None)
    }

    fn upsert(&self, _key: &str, _value: Bytes) -> Result<(), BackingError> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<(), BackingError> {
        Ok(())
    }
}

/// An in-process backing store.
#[derive(Debug, Default)]
pub struct MemoryBackingStore {
    rows: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with rows, bypassing the cache.
    pub fn with_rows<I, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let rows = rows
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.rows.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl BackingStore for MemoryBackingStore {
    fn lookup(&self, key: &str) -> Result<Option<Bytes>, BackingError> {
        Ok(self.get(key))
    }

    fn upsert(&self, key: &str, value: Bytes) -> Result<(), BackingError> {
        self.rows.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), BackingError> {
        self.rows.write().remove(key);
        Ok(())
    }
}
