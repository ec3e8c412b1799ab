//! Bounded LRU Cache Store with Expiry Support
//!
//! This module implements the core storage engine for cachekv: a key/value map
//! with a capacity bound, least-recently-used eviction and per-key TTL.
//!
//! ## Design Decisions
//!
//! 1. **One lock**: the map and the recency list live behind a single mutex, so
//!    every public operation is one critical section and the two structures can
//!    never disagree about which keys exist.
//! 2. **O(1) recency updates**: each entry keeps a handle into the
//!    [`RecencyList`], so touching, deleting or evicting a key never scans.
//! 3. **Lazy + active expiry**: `get` removes an expired key it runs into, and
//!    [`CacheStore::sweep_expired`] is driven by the background sweeper.
//! 4. **Wall-clock deadlines**: expiry is stored as `SystemTime` so snapshots
//!    written to disk stay meaningful across restarts.
//!
//! ## Layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         CacheStore                            │
//! │  Mutex<Inner>                                                 │
//! │   ┌──────────────────────────┐   ┌──────────────────────────┐ │
//! │   │ HashMap<String, Entry>   │──>│ RecencyList (MRU ... LRU)│ │
//! │   │   value, expires_at,     │   │   head            tail   │ │
//! │   │   recency handle         │   │                   evict  │ │
//! │   └──────────────────────────┘   └──────────────────────────┘ │
//! │                                                               │
//! │  TaskQueue (own lock) ── deferred set_async writes            │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use crate::storage::lru::{NodeHandle, RecencyList};
use crate::storage::queue::{QueueClosed, TaskQueue};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

/// Capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 200;

/// A stored value with its expiry deadline and recency position.
#[derive(Debug, Clone)]
struct Entry {
    /// The actual value stored
    value: Bytes,
    /// When this entry expires (None = never expires)
    expires_at: Option<SystemTime>,
    recency: NodeHandle,
}

impl Entry {
    #[inline]
    fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.map(|exp| now > exp).unwrap_or(false)
    }
}

/// Outcome of [`CacheStore::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    /// The key is not in the cache.
    Missing,
    /// The key was present but its TTL had elapsed; it has now been removed.
    Expired,
    /// The key is live.
    Hit(Bytes),
}

impl GetResult {
    pub fn exists(&self) -> bool {
        !matches!(self, GetResult::Missing)
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, GetResult::Expired)
    }

    pub fn value(&self) -> Option<&Bytes> {
        match self {
            GetResult::Hit(value) => Some(value),
            _ => None,
        }
    }
}

/// Outcome of [`CacheStore::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetResult {
    /// The key already existed and its value was replaced.
    pub overwritten: bool,
    /// The insert pushed the store over capacity and the LRU key was dropped.
    pub evicted: bool,
}

/// One entry as captured by [`CacheStore::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub key: String,
    pub value: Bytes,
    pub expires_at: Option<SystemTime>,
}

/// Callback invoked by the queue worker after a deferred set has been applied.
pub type SetCallback = Box<dyn FnOnce(SetResult) + Send + 'static>;

#[derive(Debug)]
struct Inner {
    map: HashMap<String, Entry>,
    order: RecencyList,
    capacity: usize,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.map.remove(key)?;
        self.order.remove(entry.recency);
        Some(entry)
    }

    fn set(
        &mut self,
        key: String,
        value: Bytes,
        expires_at: Option<SystemTime>,
    ) -> SetResult {
        let mut result = SetResult::default();

        if let Some(old) = self.map.remove(&key) {
            self.order.remove(old.recency);
            result.overwritten = true;
        }

        let recency = self.order.push_front(key.clone());
        self.map.insert(
            key,
            Entry {
                value,
                expires_at,
                recency,
            },
        );

        // Exactly one eviction per call, even if a shrink left us further over
        if self.map.len() > self.capacity {
            if let Some(victim) = self.order.pop_back() {
                self.map.remove(&victim);
                trace!(key = %victim, "Evicted least recently used key");
                result.evicted = true;
            }
        }

        result
    }

    /// Like [`Inner::set`], but leaves a live entry untouched.
    fn fill(
        &mut self,
        key: String,
        value: Bytes,
        expires_at: Option<SystemTime>,
        now: SystemTime,
    ) -> Option<SetResult> {
        if self.map.get(&key).is_some_and(|e| !e.is_expired_at(now)) {
            return None;
        }
        Some(self.set(key, value, expires_at))
    }
}

/// The bounded, thread-safe cache store.
///
/// Wrap it in an `Arc` and share it between the command handler, the
/// background sweeper and the persistence scheduler.
///
/// # Example
///
/// ```
/// use cachekv::storage::{CacheStore, GetResult};
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let store = CacheStore::with_capacity(2).unwrap();
///
/// store.set("a", Bytes::from("1"), Duration::ZERO);
/// store.set("b", Bytes::from("2"), Duration::ZERO);
/// let result = store.set("c", Bytes::from("3"), Duration::ZERO);
/// assert!(result.evicted);
///
/// assert_eq!(store.get("a"), GetResult::Missing);
/// assert_eq!(store.get("c"), GetResult::Hit(Bytes::from("3")));
/// ```
pub struct CacheStore {
    inner: Mutex<Inner>,

    /// Deferred writes (`set_async`)
    writes: TaskQueue,

    /// Statistics: total GET operations
    get_count: AtomicU64,
    /// Statistics: GETs that returned a live value
    hit_count: AtomicU64,
    /// Statistics: total SET operations
    set_count: AtomicU64,
    /// Statistics: successful DEL operations
    del_count: AtomicU64,
    /// Statistics: keys dropped by lazy expiry
    expired_count: AtomicU64,
    /// Statistics: keys dropped by the background sweep
    swept_count: AtomicU64,
    /// Statistics: keys dropped to respect capacity
    evicted_count: AtomicU64,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CacheStore")
            .field("len", &inner.map.len())
            .field("capacity", &inner.capacity)
            .field("writes", &self.writes)
            .finish()
    }
}

impl CacheStore {
    /// Creates a store bounded to `capacity` entries and starts its write
    /// queue worker.
    pub fn with_capacity(capacity: usize) -> std::io::Result<Self> {
        Ok(Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: RecencyList::new(),
                capacity,
            }),
            writes: TaskQueue::start("cachekv-writer")?,
            get_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
            swept_count: AtomicU64::new(0),
            evicted_count: AtomicU64::new(0),
        })
    }

    /// Looks a key up.
    ///
    /// An expired key is removed and reported once as [`GetResult::Expired`];
    /// a live key is moved to the head of the recency list.
    pub fn get(&self, key: &str) -> GetResult {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now();

        let mut inner = self.inner.lock();
        let (expired, recency) = match inner.map.get(key) {
            Some(entry) => (entry.is_expired_at(now), entry.recency),
            None => return GetResult::Missing,
        };

        if expired {
            inner.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            return GetResult::Expired;
        }

        let handle = inner.order.move_to_front(recency).unwrap_or(recency);
        match inner.map.get_mut(key) {
            Some(entry) => {
                entry.recency = handle;
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                GetResult::Hit(entry.value.clone())
            }
            None => GetResult::Missing,
        }
    }

    /// Inserts or replaces a key.
    ///
    /// A zero `ttl` means the entry never expires.
    pub fn set(&self, key: impl Into<String>, value: Bytes, ttl: Duration) -> SetResult {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        let expires_at = deadline(ttl);

        let result = self.inner.lock().set(key.into(), value, expires_at);
        if result.evicted {
            self.evicted_count.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Queues a `set` for the write worker and returns immediately.
    ///
    /// `on_complete` runs on the worker thread after the write is applied.
    pub fn set_async(
        self: &Arc<Self>,
        key: impl Into<String>,
        value: Bytes,
        ttl: Duration,
        on_complete: Option<SetCallback>,
    ) -> Result<(), QueueClosed> {
        let store = Arc::clone(self);
        let key = key.into();
        self.writes.enqueue(Box::new(move || {
            let result = store.set(key, value, ttl);
            if let Some(callback) = on_complete {
                callback(result);
            }
        }))
    }

    /// Inserts a key only if it is absent or expired.
    ///
    /// Returns `None` when a live entry was already there; that entry keeps
    /// its value, TTL and recency position.
    pub fn set_if_absent(
        &self,
        key: impl Into<String>,
        value: Bytes,
        ttl: Duration,
    ) -> Option<SetResult> {
        let now = SystemTime::now();
        let expires_at = deadline(ttl);

        let result = self.inner.lock().fill(key.into(), value, expires_at, now)?;
        self.set_count.fetch_add(1, Ordering::Relaxed);
        if result.evicted {
            self.evicted_count.fetch_add(1, Ordering::Relaxed);
        }
        Some(result)
    }

    /// Queues a [`CacheStore::set_if_absent`] for the write worker.
    ///
    /// Used for cache-aside back-fills: a `set` that lands before the worker
    /// gets to the fill wins.
    pub fn fill_async(
        self: &Arc<Self>,
        key: impl Into<String>,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), QueueClosed> {
        let store = Arc::clone(self);
        let key = key.into();
        self.writes.enqueue(Box::new(move || {
            if store.set_if_absent(key.as_str(), value, ttl).is_none() {
                trace!(key = %key, "Fill skipped, key already present");
            }
        }))
    }

    /// Deletes a key.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.inner.lock().remove(key).is_some();
        if removed {
            self.del_count.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Changes the capacity bound. Takes effect on the next `set`.
    pub fn set_max_capacity(&self, capacity: usize) {
        self.inner.lock().capacity = capacity;
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Removes every entry whose deadline has passed.
    ///
    /// This is called by the background expiry sweeper.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut inner = self.inner.lock();
        let Inner { map, order, .. } = &mut *inner;

        let before = map.len();
        map.retain(|_, entry| {
            if entry.is_expired_at(now) {
                order.remove(entry.recency);
                false
            } else {
                true
            }
        });
        let removed = before - map.len();

        if removed > 0 {
            self.swept_count.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Copies every entry, expired or not, while holding the lock.
    pub fn snapshot(&self) -> Vec<SnapshotRecord> {
        let inner = self.inner.lock();
        inner
            .map
            .iter()
            .map(|(key, entry)| SnapshotRecord {
                key: key.clone(),
                value: entry.value.clone(),
                expires_at: entry.expires_at,
            })
            .collect()
    }

    /// Re-inserts snapshot records whose deadline is still in the future.
    ///
    /// Records go through the normal insert path (recency, eviction) inside one
    /// critical section. Records with no remaining time are dropped.
    ///
    /// # Returns
    ///
    /// Returns the number of records restored.
    pub fn restore<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = SnapshotRecord>,
    {
        let now = SystemTime::now();
        let mut inner = self.inner.lock();
        let mut restored = 0;

        for record in records {
            let expires_at = match record.expires_at {
                None => None,
                Some(at) => match at.duration_since(now) {
                    Ok(remaining) if !remaining.is_zero() => Some(at),
                    _ => continue,
                },
            };

            let result = inner.set(record.key, record.value, expires_at);
            if result.evicted {
                self.evicted_count.fetch_add(1, Ordering::Relaxed);
            }
            restored += 1;
        }

        restored
    }

    /// Number of entries currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner.order.iter().map(str::to_string).collect()
    }

    /// Number of deferred writes still waiting for the worker.
    pub fn pending_writes(&self) -> usize {
        self.writes.pending()
    }

    /// Stops accepting deferred writes and waits for queued ones to finish.
    pub fn shutdown_writes(&self) {
        self.writes.shutdown();
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StorageStats {
        let gets = self.get_count.load(Ordering::Relaxed);
        let hits = self.hit_count.load(Ordering::Relaxed);
        StorageStats {
            keys: self.len() as u64,
            get_ops: gets,
            hits,
            misses: gets.saturating_sub(hits),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
            swept: self.swept_count.load(Ordering::Relaxed),
            evicted: self.evicted_count.load(Ordering::Relaxed),
        }
    }
}

/// Absolute deadline for `ttl`. A TTL past what `SystemTime` can hold is
/// clamped to the latest deadline a snapshot can record.
fn deadline(ttl: Duration) -> Option<SystemTime> {
    if ttl.is_zero() {
        return None;
    }
    SystemTime::now()
        .checked_add(ttl)
        .or_else(|| UNIX_EPOCH.checked_add(Duration::from_nanos(u64::MAX - 1)))
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of keys currently stored
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// GETs that returned a live value
    pub hits: u64,
    /// GETs that found nothing or an expired key
    pub misses: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Successful DEL operations
    pub del_ops: u64,
    /// Keys removed by lazy expiry
    pub expired: u64,
    /// Keys removed by the background sweep
    pub swept: u64,
    /// Keys evicted to respect capacity
    pub evicted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn store(capacity: usize) -> CacheStore {
        CacheStore::with_capacity(capacity).unwrap()
    }

    fn v(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_and_get() {
        let store = store(10);

        let result = store.set("key", v("value"), Duration::ZERO);
        assert_eq!(result, SetResult::default());
        assert_eq!(store.get("key"), GetResult::Hit(v("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = store(10);
        let result = store.get("nonexistent");
        assert_eq!(result, GetResult::Missing);
        assert!(!result.exists());
    }

    #[test]
    fn test_overwrite_reports_flag() {
        let store = store(10);

        store.set("k", v("v1"), Duration::ZERO);
        let result = store.set("k", v("v2"), Duration::ZERO);

        assert!(result.overwritten);
        assert!(!result.evicted);
        assert_eq!(store.get("k").value(), Some(&v("v2")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete() {
        let store = store(10);

        store.set("key", v("value"), Duration::ZERO);
        assert!(store.delete("key"));
        assert_eq!(store.get("key"), GetResult::Missing);
        assert!(!store.delete("key")); // Already deleted
    }

    #[test]
    fn test_capacity_evicts_lru() {
        let store = store(2);

        store.set("a", v("1"), Duration::ZERO);
        store.set("b", v("2"), Duration::ZERO);
        let result = store.set("c", v("3"), Duration::ZERO);

        assert!(result.evicted);
        assert_eq!(store.get("a"), GetResult::Missing);
        assert_eq!(store.get("b"), GetResult::Hit(v("2")));
        assert_eq!(store.get("c"), GetResult::Hit(v("3")));
    }

    #[test]
    fn test_get_refreshes_recency() {
        let store = store(2);

        store.set("a", v("1"), Duration::ZERO);
        store.set("b", v("2"), Duration::ZERO);
        store.get("a");
        store.set("c", v("3"), Duration::ZERO);

        assert!(store.get("a").exists());
        assert_eq!(store.get("b"), GetResult::Missing);
    }

    #[test]
    fn test_set_refreshes_recency() {
        let store = store(2);

        store.set("a", v("1"), Duration::ZERO);
        store.set("b", v("2"), Duration::ZERO);
        store.set("a", v("1b"), Duration::ZERO);
        store.set("c", v("3"), Duration::ZERO);

        assert_eq!(store.keys_by_recency(), vec!["c", "a"]);
    }

    #[test]
    fn test_lazy_expiry_reports_once() {
        let store = store(10);

        store.set("k", v("v"), Duration::from_millis(20));
        thread::sleep(Duration::from_millis(60));

        assert_eq!(store.get("k"), GetResult::Expired);
        assert_eq!(store.get("k"), GetResult::Missing);
        assert!(store.keys_by_recency().is_empty());
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let store = store(10);

        store.set("k", v("v"), Duration::ZERO);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(store.sweep_expired(), 0);
        assert_eq!(store.get("k"), GetResult::Hit(v("v")));
    }

    #[test]
    fn test_sweep_expired() {
        let store = store(10);

        store.set("key1", v("v"), Duration::from_millis(10));
        store.set("key2", v("v"), Duration::from_millis(10));
        store.set("key3", v("v"), Duration::ZERO);

        thread::sleep(Duration::from_millis(50));

        assert_eq!(store.sweep_expired(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.keys_by_recency(), vec!["key3"]);
        assert_eq!(store.stats().swept, 2);
    }

    #[test]
    fn test_shrinking_capacity_evicts_one_per_set() {
        let store = store(10);
        for i in 0..5 {
            store.set(format!("k{}", i), v("v"), Duration::ZERO);
        }

        store.set_max_capacity(2);
        assert_eq!(store.len(), 5); // no retroactive eviction

        let result = store.set("k5", v("v"), Duration::ZERO);
        assert!(result.evicted);
        assert_eq!(store.len(), 5);
        assert_eq!(store.get("k0"), GetResult::Missing);
        assert!(store.get("k1").exists());
    }

    #[test]
    fn test_snapshot_includes_unswept_expired() {
        let store = store(10);

        store.set("live", v("1"), Duration::ZERO);
        store.set("stale", v("2"), Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));

        let mut keys: Vec<String> = store.snapshot().into_iter().map(|r| r.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["live", "stale"]);
    }

    #[test]
    fn test_restore_drops_elapsed_records() {
        let store = store(10);
        let now = SystemTime::now();

        let restored = store.restore(vec![
            SnapshotRecord {
                key: "forever".to_string(),
                value: v("a"),
                expires_at: None,
            },
            SnapshotRecord {
                key: "future".to_string(),
                value: v("b"),
                expires_at: Some(now + Duration::from_secs(60)),
            },
            SnapshotRecord {
                key: "past".to_string(),
                value: v("c"),
                expires_at: Some(now - Duration::from_secs(1)),
            },
        ]);

        assert_eq!(restored, 2);
        assert_eq!(store.get("forever"), GetResult::Hit(v("a")));
        assert_eq!(store.get("future"), GetResult::Hit(v("b")));
        assert_eq!(store.get("past"), GetResult::Missing);
    }

    #[test]
    fn test_set_async_applies_and_calls_back() {
        let store = Arc::new(store(10));
        let (tx, rx) = mpsc::channel();

        store
            .set_async(
                "k",
                v("v"),
                Duration::ZERO,
                Some(Box::new(move |result| tx.send(result).unwrap())),
            )
            .unwrap();

        let result = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(result, SetResult::default());
        assert_eq!(store.get("k"), GetResult::Hit(v("v")));
    }

    #[test]
    fn test_set_async_rejected_after_shutdown() {
        let store = Arc::new(store(10));

        store.set_async("a", v("1"), Duration::ZERO, None).unwrap();
        store.shutdown_writes();

        assert_eq!(store.get("a"), GetResult::Hit(v("1")));
        assert_eq!(
            store.set_async("b", v("2"), Duration::ZERO, None),
            Err(QueueClosed)
        );
    }

    #[test]
    fn test_set_if_absent_keeps_live_entry() {
        let store = store(10);

        assert_eq!(
            store.set_if_absent("k", v("first"), Duration::ZERO),
            Some(SetResult::default())
        );
        assert_eq!(store.set_if_absent("k", v("second"), Duration::ZERO), None);
        assert_eq!(store.get("k"), GetResult::Hit(v("first")));
    }

    #[test]
    fn test_set_if_absent_replaces_expired_entry() {
        let store = store(10);

        store.set("k", v("old"), Duration::from_secs(1));
        thread::sleep(Duration::from_millis(1100));

        let result = store.set_if_absent("k", v("new"), Duration::ZERO).unwrap();
        assert!(result.overwritten);
        assert_eq!(store.get("k"), GetResult::Hit(v("new")));
    }

    #[test]
    fn test_fill_async_loses_to_earlier_set() {
        let store = Arc::new(store(10));
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Park the worker so both writes are decided in queue order
        store
            .set_async(
                "gate",
                v("x"),
                Duration::ZERO,
                Some(Box::new(move |_| {
                    let _ = release_rx.recv();
                })),
            )
            .unwrap();
        store.fill_async("k", v("stale"), Duration::from_secs(60)).unwrap();
        store.set("k", v("fresh"), Duration::ZERO);

        release_tx.send(()).unwrap();
        store.shutdown_writes();

        assert_eq!(store.get("k"), GetResult::Hit(v("fresh")));
    }

    #[test]
    fn test_huge_ttl_is_clamped_not_immortal() {
        let store = store(10);

        store.set("k", v("v"), Duration::from_secs(u64::MAX));
        let record = store.snapshot().pop().unwrap();
        assert!(record.expires_at.is_some());
        assert_eq!(store.get("k"), GetResult::Hit(v("v")));
    }

    #[test]
    fn test_stats() {
        let store = store(1);

        store.set("a", v("1"), Duration::ZERO);
        store.set("b", v("2"), Duration::ZERO);
        store.get("a");
        store.get("b");
        store.delete("b");

        let stats = store.stats();
        assert_eq!(stats.set_ops, 2);
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.del_ops, 1);
        assert_eq!(stats.keys, 0);
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(store(10_000));
        let mut handles = vec![];

        // Spawn multiple writers
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    store.set(key.clone(), v("value"), Duration::ZERO);
                    store.get(&key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 1000);
        assert_eq!(store.keys_by_recency().len(), 1000);
    }

    #[test]
    fn test_concurrent_same_key_last_writer_wins() {
        let store = Arc::new(store(10));
        let left = "l".repeat(512);
        let right = "r".repeat(512);

        let handles: Vec<_> = [left.clone(), right.clone()]
            .into_iter()
            .map(|value| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..200 {
                        store.set("shared", Bytes::from(value.clone()), Duration::ZERO);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let value = store.get("shared");
        let value = value.value().unwrap();
        assert!(value == &Bytes::from(left) || value == &Bytes::from(right));
        assert_eq!(store.len(), 1);
    }
}
