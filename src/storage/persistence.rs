//! Snapshot Persistence
//!
//! Writes the whole store to a flat file and reads it back.
//!
//! ## File Format
//!
//! One record per line, three tab-separated fields:
//!
//! ```text
//! <key>\t<value>\t<expire-at nanoseconds since the Unix epoch>\n
//! ```
//!
//! Entries that never expire are written with the sentinel `u64::MAX`.
//! Keys and values containing a tab or a newline cannot be represented and are
//! skipped on write.
//!
//! ## Crash Safety
//!
//! The snapshot is taken under the store lock, then written outside it to a
//! sibling `*.tmp` file which is synced and renamed over the target. A crash
//! mid-write leaves the previous snapshot intact.
//!
//! Snapshots do not filter entries that have expired but not yet been swept;
//! the loader drops anything whose deadline is not strictly in the future.

use crate::storage::periodic::PeriodicTask;
use crate::storage::{CacheStore, SnapshotRecord};
use bytes::Bytes;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Expiry field written for entries with no deadline.
pub const NEVER_EXPIRES: u64 = u64::MAX;

const FIELD_SEPARATOR: u8 = b'\t';
const RECORD_SEPARATOR: u8 = b'\n';

/// Errors raised while reading or writing a snapshot file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PersistenceError {
    fn io(path: &Path, source: io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a load did with the records it found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Records re-inserted into the store
    pub restored: usize,
    /// Well-formed records whose deadline had already passed
    pub expired: usize,
    /// Lines that could not be parsed
    pub malformed: usize,
}

/// Writes every entry in the store to `path`.
///
/// # Returns
///
/// Returns the number of records written.
pub fn persist_to_file(store: &CacheStore, path: &Path) -> Result<usize, PersistenceError> {
    let records = store.snapshot();

    let tmp_path = temp_path(path);
    let file = File::create(&tmp_path).map_err(|e| PersistenceError::io(&tmp_path, e))?;
    let mut writer = BufWriter::new(file);

    let mut written = 0;
    for record in &records {
        if !is_representable(record.key.as_bytes()) || !is_representable(&record.value) {
            warn!(key = %record.key, "Skipping record that contains a tab or newline");
            continue;
        }
        write_record(&mut writer, record).map_err(|e| PersistenceError::io(&tmp_path, e))?;
        written += 1;
    }

    let file = writer
        .into_inner()
        .map_err(|e| PersistenceError::io(&tmp_path, e.into_error()))?;
    file.sync_all()
        .map_err(|e| PersistenceError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| PersistenceError::io(path, e))?;

    debug!(path = %path.display(), records = written, "Snapshot written");
    Ok(written)
}

/// Reads a snapshot from `path` and restores its live records into the store.
///
/// A missing file is not an error: it yields an empty summary.
pub fn load_from_file(store: &CacheStore, path: &Path) -> Result<LoadSummary, PersistenceError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No snapshot to load");
            return Ok(LoadSummary::default());
        }
        Err(e) => return Err(PersistenceError::io(path, e)),
    };

    let now = SystemTime::now();
    let mut summary = LoadSummary::default();
    let mut records = Vec::new();

    for line in data.split(|b| *b == RECORD_SEPARATOR) {
        if line.is_empty() {
            continue;
        }
        match parse_record(line) {
            Some(record) if is_live(&record, now) => records.push(record),
            Some(_) => summary.expired += 1,
            None => summary.malformed += 1,
        }
    }

    let candidates = records.len();
    summary.restored = store.restore(records);
    // Records that crossed their deadline between parsing and restoring
    summary.expired += candidates - summary.restored;

    if summary.malformed > 0 {
        warn!(
            path = %path.display(),
            malformed = summary.malformed,
            "Skipped malformed snapshot lines"
        );
    }
    info!(
        path = %path.display(),
        restored = summary.restored,
        expired = summary.expired,
        "Snapshot loaded"
    );

    Ok(summary)
}

fn write_record<W: Write>(writer: &mut W, record: &SnapshotRecord) -> io::Result<()> {
    writer.write_all(record.key.as_bytes())?;
    writer.write_all(&[FIELD_SEPARATOR])?;
    writer.write_all(&record.value)?;
    writer.write_all(&[FIELD_SEPARATOR])?;
    write!(writer, "{}", encode_deadline(record.expires_at))?;
    writer.write_all(&[RECORD_SEPARATOR])
}

fn parse_record(line: &[u8]) -> Option<SnapshotRecord> {
    let mut fields = line.splitn(3, |b| *b == FIELD_SEPARATOR);
    let key = std::str::from_utf8(fields.next()?).ok()?;
    let value = fields.next()?;
    let expires = std::str::from_utf8(fields.next()?).ok()?;
    let expires: u64 = expires.trim_end_matches('\r').parse().ok()?;

    if key.is_empty() {
        return None;
    }

    Some(SnapshotRecord {
        key: key.to_string(),
        value: Bytes::copy_from_slice(value),
        expires_at: decode_deadline(expires),
    })
}

fn is_live(record: &SnapshotRecord, now: SystemTime) -> bool {
    match record.expires_at {
        None => true,
        Some(at) => at > now,
    }
}

fn is_representable(bytes: &[u8]) -> bool {
    !bytes
        .iter()
        .any(|b| *b == FIELD_SEPARATOR || *b == RECORD_SEPARATOR)
}

fn encode_deadline(expires_at: Option<SystemTime>) -> u64 {
    match expires_at {
        None => NEVER_EXPIRES,
        Some(at) => at
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(NEVER_EXPIRES - 1))
            .unwrap_or(0),
    }
}

fn decode_deadline(nanos: u64) -> Option<SystemTime> {
    if nanos == NEVER_EXPIRES {
        None
    } else {
        UNIX_EPOCH.checked_add(Duration::from_nanos(nanos))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Periodically writes snapshots on a dedicated thread.
///
/// Stopping the scheduler joins the thread and then writes one final snapshot,
/// so writes accepted before shutdown reach disk.
#[derive(Debug)]
pub struct PersistenceScheduler {
    task: PeriodicTask,
    store: Arc<CacheStore>,
    path: PathBuf,
    stopped: bool,
}

impl PersistenceScheduler {
    pub fn start(
        store: Arc<CacheStore>,
        path: PathBuf,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let task_store = Arc::clone(&store);
        let task_path = path.clone();
        let task = PeriodicTask::spawn("cachekv-persist", interval, move || {
            if let Err(e) = persist_to_file(&task_store, &task_path) {
                warn!(error = %e, "Periodic snapshot failed");
            }
        })?;

        info!(
            path = %path.display(),
            interval_secs = interval.as_secs(),
            "Snapshot scheduler started"
        );

        Ok(Self {
            task,
            store,
            path,
            stopped: false,
        })
    }

    /// Stops the timer thread and writes a final snapshot.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.task.stop();

        match persist_to_file(&self.store, &self.path) {
            Ok(records) => info!(records, "Final snapshot written"),
            Err(e) => warn!(error = %e, "Final snapshot failed"),
        }
    }
}

impl Drop for PersistenceScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
