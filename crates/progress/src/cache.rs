//! Persistent last-known progress, one entry per job.
//!
//! The cache only seeds the first render of a remounted tracker so it
//! does not flash back to 0%. It is advisory: the next network response
//! always supersedes it, and concurrent writers simply overwrite each
//! other. Entries never expire on their own; they are removed when the
//! job reaches a terminal status.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use schedgen_core::generation::JobStatus;
use schedgen_core::progress::ProgressState;
use schedgen_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

/// Every entry is stored under `progress_<jobId>`.
pub const CACHE_KEY_PREFIX: &str = "progress_";

/// Storage key for a job's entry.
pub fn cache_key(job_id: &JobId) -> String {
    format!("{CACHE_KEY_PREFIX}{job_id}")
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A cached progress snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub job_id: JobId,
    pub state: ProgressState,
    pub written_at: Option<Timestamp>,
}

/// Serialized form: `{ progress, status, phase, timeRemaining, writtenAt }`.
///
/// Everything but `progress` and `status` is optional so records written
/// by older clients still hydrate.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    progress: f64,
    status: String,
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    time_remaining: Option<i64>,
    #[serde(default)]
    written_at: Option<Timestamp>,
}

impl CacheEntry {
    pub fn new(job_id: JobId, state: ProgressState) -> Self {
        Self {
            job_id,
            state,
            written_at: Some(Utc::now()),
        }
    }

    pub fn encode(&self) -> Result<String, CacheError> {
        let record = StoredRecord {
            progress: f64::from(self.state.percent),
            status: self.state.status.as_str().to_string(),
            phase: Some(self.state.phase_label.clone()),
            time_remaining: self
                .state
                .time_remaining_seconds
                .and_then(|s| i64::try_from(s).ok()),
            written_at: self.written_at,
        };
        Ok(serde_json::to_string(&record)?)
    }

    pub fn decode(job_id: &JobId, raw: &str) -> Result<Self, CacheError> {
        let record: StoredRecord = serde_json::from_str(raw)?;
        let status = JobStatus::parse(&record.status)
            .map_err(|_| CacheError::Corrupt(format!("unknown status {:?}", record.status)))?;
        let state = ProgressState::reported(
            record.progress,
            status,
            record.phase,
            record.time_remaining,
        );
        Ok(Self {
            job_id: job_id.clone(),
            state,
            written_at: record.written_at,
        })
    }
}

/// Errors from a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Key-value persistence of the latest [`ProgressState`] per job.
pub trait ProgressCache: Send + Sync {
    /// Full entry for `job_id`, if one is stored and readable.
    fn entry(&self, job_id: &JobId) -> Option<CacheEntry>;

    /// Overwrite the entry for `job_id`.
    fn set(&self, job_id: &JobId, state: &ProgressState) -> Result<(), CacheError>;

    /// Remove the entry for `job_id`. Removing a missing entry is a no-op.
    fn clear(&self, job_id: &JobId) -> Result<(), CacheError>;

    /// Cached state for `job_id`, if any.
    fn get(&self, job_id: &JobId) -> Option<ProgressState> {
        self.entry(job_id).map(|entry| entry.state)
    }
}

/// Decode a raw entry, logging (and reporting) unreadable ones.
fn decode_or_warn(job_id: &JobId, raw: &str) -> Option<CacheEntry> {
    match CacheEntry::decode(job_id, raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Discarding unreadable progress cache entry");
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// In-process cache holding serialized entries, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw serialized value under `key`, bypassing encoding.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        lock(&self.entries).insert(key.into(), value.into());
    }

    /// Raw serialized value stored under `key`.
    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProgressCache for MemoryCache {
    fn entry(&self, job_id: &JobId) -> Option<CacheEntry> {
        let raw = self.raw(&cache_key(job_id))?;
        let entry = decode_or_warn(job_id, &raw);
        if entry.is_none() {
            lock(&self.entries).remove(&cache_key(job_id));
        }
        entry
    }

    fn set(&self, job_id: &JobId, state: &ProgressState) -> Result<(), CacheError> {
        let encoded = CacheEntry::new(job_id.clone(), state.clone()).encode()?;
        lock(&self.entries).insert(cache_key(job_id), encoded);
        Ok(())
    }

    fn clear(&self, job_id: &JobId) -> Result<(), CacheError> {
        lock(&self.entries).remove(&cache_key(job_id));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileCache
// ---------------------------------------------------------------------------

/// Cache persisted as one JSON file per job inside a directory.
///
/// Survives process restarts and is shared by every tracker pointed at
/// the same directory. Writes go through a temporary file and a rename,
/// so a reader never sees a half-written entry; the last writer wins.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the entry for `job_id`.
    ///
    /// Characters outside `[A-Za-z0-9_-]` are replaced so an arbitrary
    /// job id cannot escape the cache directory.
    pub fn entry_path(&self, job_id: &JobId) -> PathBuf {
        let safe: String = cache_key(job_id)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl ProgressCache for FileCache {
    fn entry(&self, job_id: &JobId) -> Option<CacheEntry> {
        let path = self.entry_path(job_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read progress cache");
                return None;
            }
        };

        let entry = decode_or_warn(job_id, &raw);
        if entry.is_none() {
            if let Err(e) = self.clear(job_id) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove corrupt cache entry");
            }
        }
        entry
    }

    fn set(&self, job_id: &JobId, state: &ProgressState) -> Result<(), CacheError> {
        let encoded = CacheEntry::new(job_id.clone(), state.clone()).encode()?;
        std::fs::create_dir_all(&self.dir)?;

        let path = self.entry_path(job_id);
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        std::fs::write(&tmp, encoded)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn clear(&self, job_id: &JobId) -> Result<(), CacheError> {
        match std::fs::remove_file(self.entry_path(job_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
