//! Snapshot cache with a stated time-to-live
//!
//! The cache is injected into `ingest`; there is no global or session state.
//! Keys are content hashes, so an unchanged export is never re-normalized
//! while its entry is fresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SheetConfig;
use crate::error::Result;
use crate::sheet::{RawSheet, SourceFile};
use crate::table::EntityTable;

/// One normalized ingestion cycle
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub snapshot_id: Uuid,
    /// Name of the file this snapshot was returned for
    pub source: String,
    /// "sha256:<hex>" of the source bytes
    pub content_hash: String,
    pub built_at: DateTime<Utc>,
    pub table: Arc<EntityTable>,
}

pub trait SnapshotCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Snapshot>;
    fn put(&self, key: &str, snapshot: Snapshot);
}

struct CacheEntry {
    stored_at: Instant,
    snapshot: Snapshot,
}

/// In-memory cache; expired entries are misses and are evicted on access
pub struct TtlCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        before - entries.len()
    }
}

impl SnapshotCache for TtlCache {
    fn get(&self, key: &str) -> Option<Snapshot> {
        let mut entries = self.entries.lock();
        let fresh = entries.get(key)?.stored_at.elapsed() < self.ttl;
        if !fresh {
            entries.remove(key);
            debug!(key, "evicted expired snapshot");
            return None;
        }
        entries.get(key).map(|e| e.snapshot.clone())
    }

    fn put(&self, key: &str, snapshot: Snapshot) {
        self.entries.lock().insert(
            key.to_string(),
            CacheEntry {
                stored_at: Instant::now(),
                snapshot,
            },
        );
    }
}

/// Cache that never holds anything
pub struct NoCache;

impl SnapshotCache for NoCache {
    fn get(&self, _key: &str) -> Option<Snapshot> {
        None
    }

    fn put(&self, _key: &str, _snapshot: Snapshot) {}
}

/// Cache key: content hash plus the `as_of` date that dated undated columns
pub fn cache_key(content_hash: &str, as_of: Option<NaiveDate>) -> String {
    match as_of {
        Some(date) => format!("{}@{}", content_hash, date.format("%Y-%m-%d")),
        None => content_hash.to_string(),
    }
}

/// Load and normalize one source file, reusing a fresh cached snapshot.
///
/// Failures are returned to the caller and never cached.
pub fn ingest(
    source: &SourceFile,
    config: &SheetConfig,
    as_of: Option<NaiveDate>,
    cache: &dyn SnapshotCache,
) -> Result<Snapshot> {
    let content_hash = source.content_hash();
    let key = cache_key(&content_hash, as_of);

    if let Some(snapshot) = cache.get(&key) {
        info!(
            source = %source.name,
            snapshot_id = %snapshot.snapshot_id,
            "snapshot cache hit"
        );
        // Same bytes may arrive under another name
        return Ok(Snapshot {
            source: source.name.clone(),
            ..snapshot
        });
    }

    let sheet = RawSheet::load(source, config)?;
    let table = crate::normalize(&sheet, config, as_of)?;

    let snapshot = Snapshot {
        snapshot_id: Uuid::new_v4(),
        source: source.name.clone(),
        content_hash,
        built_at: Utc::now(),
        table: Arc::new(table),
    };
    info!(
        source = %snapshot.source,
        snapshot_id = %snapshot.snapshot_id,
        records = snapshot.table.records().len(),
        "built snapshot"
    );
    cache.put(&key, snapshot.clone());
    Ok(snapshot)
}
