//! Append-only progress log with atomic replace writes and monthly archival.
//!
//! The live store lives at `.cadence/progress.yaml`. Every append is a full
//! read-modify-atomic-replace cycle, so a reader never observes a partially
//! written store and an interrupted append leaves the prior state intact.
//! Entries older than the configured age threshold move to write-once monthly
//! partitions under `.cadence/archive/` once the live store outgrows its size
//! threshold.

use crate::config::ArchiveConfig;
use crate::error::{CadenceError, Result};
use crate::paths;
use crate::types::EntryKind;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// One immutable progress event. Only archival ever relocates an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, String>,
}

impl LogEntry {
    /// Build an entry with an id derived from `timestamp` and `seq`.
    /// Ids are unique within a log because `seq` is monotonic per store.
    pub fn new(
        kind: EntryKind,
        payload: BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
        seq: u64,
    ) -> Self {
        Self {
            id: format!("{}-{:04}", timestamp.format("%Y%m%dT%H%M%SZ"), seq),
            timestamp,
            kind,
            payload,
        }
    }

    /// Archive partition key for this entry's calendar month.
    pub fn period(&self) -> String {
        format!("{:04}-{:02}", self.timestamp.year(), self.timestamp.month())
    }
}

// ---------------------------------------------------------------------------
// LogMetadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogMetadata {
    pub total_entries: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Monotonic append counter; never decreases, not even after archival,
    /// so ids stay unique across the live store and all partitions.
    #[serde(default)]
    pub next_seq: u64,
}

// ---------------------------------------------------------------------------
// LogStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStore {
    #[serde(default = "default_version")]
    pub version: u32,
    pub entries: Vec<LogEntry>,
    #[serde(default)]
    pub metadata: LogMetadata,
}

fn default_version() -> u32 {
    1
}

/// What `archive()` did: how many entries moved, into which partitions.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    pub archived: usize,
    pub partitions: Vec<String>,
}

/// One write-once monthly partition file. No metadata block — partitions are
/// plain entry sequences keyed by period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivePartition {
    pub period: String,
    pub entries: Vec<LogEntry>,
}

impl LogStore {
    pub fn new() -> Self {
        Self {
            version: 1,
            entries: Vec::new(),
            metadata: LogMetadata::default(),
        }
    }

    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    /// Load the live store. A missing file yields an empty store; a present
    /// but unparsable file is `CorruptStore` — history is never silently
    /// discarded.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::progress_path(root);
        if !path.exists() {
            return Ok(Self::new());
        }
        crate::io::read_yaml(&path)
    }

    pub fn save(&mut self, root: &Path) -> Result<()> {
        self.recompute_metadata();
        crate::io::atomic_write_yaml(&paths::progress_path(root), self)
    }

    fn recompute_metadata(&mut self) {
        self.metadata.total_entries = self.entries.len();
        self.metadata.oldest = self.entries.first().map(|e| e.timestamp);
        self.metadata.newest = self.entries.last().map(|e| e.timestamp);
        self.metadata.last_updated = Some(Utc::now());
    }

    // ---------------------------------------------------------------------------
    // Append
    // ---------------------------------------------------------------------------

    /// Validate, stamp, and durably append one entry. Returns the stored entry.
    pub fn append(
        root: &Path,
        kind: EntryKind,
        payload: BTreeMap<String, String>,
    ) -> Result<LogEntry> {
        validate_payload(kind, &payload)?;
        let mut store = Self::load(root)?;
        let seq = store.metadata.next_seq + 1;
        let entry = LogEntry::new(kind, payload, Utc::now(), seq);
        store.metadata.next_seq = seq;
        store.entries.push(entry.clone());
        store.save(root)?;
        tracing::debug!(id = %entry.id, kind = %kind, "appended log entry");
        Ok(entry)
    }

    /// The last `n` entries in insertion order. Fewer than `n` returns all.
    pub fn recent(&self, n: usize) -> &[LogEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    // ---------------------------------------------------------------------------
    // Archival
    // ---------------------------------------------------------------------------

    /// Partition entries older than the age threshold into monthly archive
    /// files, then rewrite the live store without them. No-op until the live
    /// count exceeds `cfg.max_live_entries`. Lossless: the union of live and
    /// archived entries is unchanged.
    pub fn archive(root: &Path, cfg: &ArchiveConfig) -> Result<ArchiveOutcome> {
        let mut store = Self::load(root)?;
        if store.entries.len() <= cfg.max_live_entries {
            return Ok(ArchiveOutcome {
                archived: 0,
                partitions: Vec::new(),
            });
        }

        let cutoff = Utc::now() - Duration::days(cfg.max_age_days);
        let (old, live): (Vec<LogEntry>, Vec<LogEntry>) = store
            .entries
            .drain(..)
            .partition(|e| e.timestamp < cutoff);

        if old.is_empty() {
            store.entries = live;
            return Ok(ArchiveOutcome {
                archived: 0,
                partitions: Vec::new(),
            });
        }

        let mut by_period: BTreeMap<String, Vec<LogEntry>> = BTreeMap::new();
        for entry in old {
            by_period.entry(entry.period()).or_default().push(entry);
        }

        // Write partitions first; only then commit the shrunken live store.
        // An interruption in between duplicates entries (live + archive) but
        // never loses any.
        let mut archived = 0;
        let mut partitions = Vec::new();
        for (period, entries) in &by_period {
            archived += entries.len();
            merge_partition(root, period, entries)?;
            partitions.push(period.clone());
        }

        store.entries = live;
        store.save(root)?;
        tracing::info!(archived, partitions = partitions.len(), "archived log entries");
        Ok(ArchiveOutcome {
            archived,
            partitions,
        })
    }

    /// Read one archive partition, if it exists.
    pub fn load_partition(root: &Path, period: &str) -> Result<Option<ArchivePartition>> {
        let path = paths::archive_path(root, period);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(crate::io::read_yaml(&path)?))
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only merge into a partition file: new entries for an already
/// archived period join the existing ones, existing entries are never
/// rewritten or dropped.
fn merge_partition(root: &Path, period: &str, entries: &[LogEntry]) -> Result<()> {
    let mut partition = match LogStore::load_partition(root, period)? {
        Some(p) => p,
        None => ArchivePartition {
            period: period.to_string(),
            entries: Vec::new(),
        },
    };
    let known: std::collections::BTreeSet<&str> =
        partition.entries.iter().map(|e| e.id.as_str()).collect();
    let fresh: Vec<LogEntry> = entries
        .iter()
        .filter(|e| !known.contains(e.id.as_str()))
        .cloned()
        .collect();
    partition.entries.extend(fresh);
    crate::io::atomic_write_yaml(&paths::archive_path(root, period), &partition)
}

/// Reject an entry whose required fields are missing or empty before any
/// write happens.
fn validate_payload(kind: EntryKind, payload: &BTreeMap<String, String>) -> Result<()> {
    for field in kind.required_fields() {
        match payload.get(*field) {
            Some(v) if !v.trim().is_empty() => {}
            Some(_) => {
                return Err(CadenceError::Schema {
                    kind: kind.to_string(),
                    reason: format!("field '{field}' is empty"),
                })
            }
            None => {
                return Err(CadenceError::Schema {
                    kind: kind.to_string(),
                    reason: format!("missing required field '{field}'"),
                })
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn payload(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn append_grows_store_in_insertion_order() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            LogStore::append(
                dir.path(),
                EntryKind::TaskCompleted,
                payload(&[("task_id", &format!("1.{i}"))]),
            )
            .unwrap();
        }

        let store = LogStore::load(dir.path()).unwrap();
        assert_eq!(store.entries.len(), 5);
        assert_eq!(store.metadata.total_entries, 5);
        for w in store.entries.windows(2) {
            assert!(w[0].timestamp <= w[1].timestamp);
            assert!(w[0].id < w[1].id);
        }
    }

    #[test]
    fn append_rejects_missing_required_field() {
        let dir = TempDir::new().unwrap();
        let err =
            LogStore::append(dir.path(), EntryKind::TaskBlocked, payload(&[("task_id", "2")]))
                .unwrap_err();
        assert!(matches!(err, CadenceError::Schema { .. }));
        // Nothing was written
        assert!(!dir.path().join(".cadence/progress.yaml").exists());
    }

    #[test]
    fn append_rejects_empty_required_field() {
        let dir = TempDir::new().unwrap();
        let err = LogStore::append(
            dir.path(),
            EntryKind::DebugResolved,
            payload(&[("problem", "flaky test"), ("resolution", "  ")]),
        )
        .unwrap_err();
        assert!(matches!(err, CadenceError::Schema { .. }));
    }

    #[test]
    fn corrupt_store_fails_append_and_leaves_bytes_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".cadence/progress.yaml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"entries: [unterminated").unwrap();
        let before = std::fs::read(&path).unwrap();

        let err = LogStore::append(
            dir.path(),
            EntryKind::SessionStarted,
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CadenceError::CorruptStore { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn recent_tolerates_short_store() {
        let dir = TempDir::new().unwrap();
        LogStore::append(dir.path(), EntryKind::SessionStarted, BTreeMap::new()).unwrap();
        let store = LogStore::load(dir.path()).unwrap();
        assert_eq!(store.recent(10).len(), 1);
        assert_eq!(store.recent(0).len(), 0);
    }

    fn seed_store(dir: &TempDir, total: usize, old_count: usize, age_days: i64) {
        seed_store_from(dir, total, old_count, age_days, 0);
    }

    fn seed_store_from(dir: &TempDir, total: usize, old_count: usize, age_days: i64, seq0: u64) {
        let mut store = LogStore::new();
        let now = Utc::now();
        for i in 0..total {
            let ts = if i < old_count {
                now - Duration::days(age_days)
            } else {
                now
            };
            let seq = seq0 + (i + 1) as u64;
            store.entries.push(LogEntry::new(
                EntryKind::TaskCompleted,
                payload(&[("task_id", &format!("{i}"))]),
                ts,
                seq,
            ));
            store.metadata.next_seq = seq;
        }
        store.save(dir.path()).unwrap();
    }

    #[test]
    fn archive_moves_old_entries_into_monthly_partition() {
        let dir = TempDir::new().unwrap();
        seed_store(&dir, 501, 1, 40);
        let old_id = LogStore::load(dir.path()).unwrap().entries[0].id.clone();
        let old_period = LogStore::load(dir.path()).unwrap().entries[0].period();

        let outcome = LogStore::archive(dir.path(), &ArchiveConfig::default()).unwrap();
        assert_eq!(outcome.archived, 1);
        assert_eq!(outcome.partitions, vec![old_period.clone()]);

        let store = LogStore::load(dir.path()).unwrap();
        assert_eq!(store.entries.len(), 500);
        assert!(store.entries.iter().all(|e| e.id != old_id));

        let partition = LogStore::load_partition(dir.path(), &old_period)
            .unwrap()
            .unwrap();
        assert_eq!(partition.entries.len(), 1);
        assert_eq!(partition.entries[0].id, old_id);
    }

    #[test]
    fn archive_is_noop_below_size_threshold() {
        let dir = TempDir::new().unwrap();
        seed_store(&dir, 100, 50, 40);
        let outcome = LogStore::archive(dir.path(), &ArchiveConfig::default()).unwrap();
        assert_eq!(outcome.archived, 0);
        assert_eq!(LogStore::load(dir.path()).unwrap().entries.len(), 100);
    }

    #[test]
    fn archive_is_lossless() {
        let dir = TempDir::new().unwrap();
        seed_store(&dir, 520, 30, 45);
        let before: Vec<String> = LogStore::load(dir.path())
            .unwrap()
            .entries
            .iter()
            .map(|e| e.id.clone())
            .collect();

        let outcome = LogStore::archive(dir.path(), &ArchiveConfig::default()).unwrap();
        assert_eq!(outcome.archived, 30);

        let mut after: Vec<String> = LogStore::load(dir.path())
            .unwrap()
            .entries
            .iter()
            .map(|e| e.id.clone())
            .collect();
        for period in &outcome.partitions {
            let p = LogStore::load_partition(dir.path(), period).unwrap().unwrap();
            after.extend(p.entries.iter().map(|e| e.id.clone()));
        }
        after.sort();
        let mut expected = before;
        expected.sort();
        assert_eq!(after, expected);
    }

    #[test]
    fn archive_merges_into_existing_partition() {
        let dir = TempDir::new().unwrap();
        seed_store(&dir, 510, 5, 40);
        let period = LogStore::load(dir.path()).unwrap().entries[0].period();
        LogStore::archive(dir.path(), &ArchiveConfig::default()).unwrap();
        let first = LogStore::load_partition(dir.path(), &period)
            .unwrap()
            .unwrap()
            .entries
            .len();
        assert_eq!(first, 5);

        // Same period gets more old entries later; they merge, not overwrite.
        seed_store_from(&dir, 510, 3, 40, 1000);
        LogStore::archive(dir.path(), &ArchiveConfig::default()).unwrap();
        let merged = LogStore::load_partition(dir.path(), &period)
            .unwrap()
            .unwrap()
            .entries
            .len();
        assert!(merged >= first + 3);
    }
}
