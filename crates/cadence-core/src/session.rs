//! Session lifecycle. Exactly one session record exists while work is in
//! flight; it is created at session start, consumed at session end, and the
//! end writes a checkpoint. A session that crashed without cleanup is
//! superseded at the next start: the fresh `session_started` entry carries a
//! `recovered_from` field instead of a fabricated `session_ended`.

use crate::checkpoint::Checkpoint;
use crate::config::EngineConfig;
use crate::error::{CadenceError, Result};
use crate::log::LogStore;
use crate::paths;
use crate::task::TaskId;
use crate::types::EntryKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
}

impl SessionState {
    /// Begin a session: log `session_started` and write the session record.
    /// A leftover record from an unclean shutdown is superseded, noted in the
    /// new entry's `recovered_from` payload.
    pub fn start(root: &Path, spec: Option<&str>) -> Result<SessionState> {
        let path = paths::session_path(root);
        let mut payload = BTreeMap::new();
        if let Some(spec) = spec {
            payload.insert("spec".to_string(), spec.to_string());
        }
        if path.exists() {
            let stale = match crate::io::read_yaml::<SessionState>(&path) {
                Ok(s) => s.started_at.to_rfc3339(),
                Err(_) => "unknown".to_string(),
            };
            tracing::warn!(recovered_from = %stale, "superseding stale session record");
            payload.insert("recovered_from".to_string(), stale);
        }

        LogStore::append(root, EntryKind::SessionStarted, payload)?;

        let state = SessionState {
            started_at: Utc::now(),
            active_task_id: None,
            spec: spec.map(str::to_string),
        };
        crate::io::atomic_write_yaml(&path, &state)?;
        Ok(state)
    }

    /// The active session record, if one exists.
    pub fn current(root: &Path) -> Result<Option<SessionState>> {
        let path = paths::session_path(root);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(crate::io::read_yaml(&path)?))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        crate::io::atomic_write_yaml(&paths::session_path(root), self)
    }

    /// End the session: log `session_ended`, write a checkpoint, delete the
    /// record. Consumes the state — a session ends exactly once.
    pub fn end(self, root: &Path, cfg: &EngineConfig, revision: Option<String>) -> Result<Checkpoint> {
        let duration = (Utc::now() - self.started_at).num_minutes();
        let completed = tasks_completed_since(root, self.started_at)?;

        let mut payload = BTreeMap::new();
        payload.insert("duration_minutes".to_string(), duration.to_string());
        payload.insert("tasks_completed".to_string(), completed.to_string());
        if let Some(spec) = &self.spec {
            payload.insert("spec".to_string(), spec.clone());
        }
        LogStore::append(root, EntryKind::SessionEnded, payload)?;

        let checkpoint = Checkpoint::new(revision, duration, completed);
        checkpoint.write(root, &cfg.checkpoints)?;

        std::fs::remove_file(paths::session_path(root))?;
        Ok(checkpoint)
    }

    /// Like `current`, but an absent session is an error. Used by operations
    /// that only make sense mid-session.
    pub fn require(root: &Path) -> Result<SessionState> {
        Self::current(root)?.ok_or(CadenceError::SessionNotFound)
    }
}

fn tasks_completed_since(root: &Path, since: DateTime<Utc>) -> Result<usize> {
    let store = LogStore::load(root)?;
    Ok(store
        .entries
        .iter()
        .filter(|e| e.kind == EntryKind::TaskCompleted && e.timestamp >= since)
        .count())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn start_end_lifecycle() {
        let dir = TempDir::new().unwrap();
        let cfg = EngineConfig::new("proj");

        let state = SessionState::start(dir.path(), Some("auth-rework")).unwrap();
        assert!(SessionState::current(dir.path()).unwrap().is_some());

        let checkpoint = state.end(dir.path(), &cfg, Some("abc123".into())).unwrap();
        assert_eq!(checkpoint.external_revision.as_deref(), Some("abc123"));
        assert!(SessionState::current(dir.path()).unwrap().is_none());

        let store = LogStore::load(dir.path()).unwrap();
        let kinds: Vec<_> = store.entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::SessionStarted, EntryKind::SessionEnded]);
    }

    #[test]
    fn end_writes_checkpoint() {
        let dir = TempDir::new().unwrap();
        let cfg = EngineConfig::new("proj");
        let state = SessionState::start(dir.path(), None).unwrap();
        state.end(dir.path(), &cfg, None).unwrap();
        assert!(Checkpoint::latest(dir.path()).unwrap().is_some());
    }

    #[test]
    fn stale_session_is_superseded_with_recovery_note() {
        let dir = TempDir::new().unwrap();
        SessionState::start(dir.path(), None).unwrap();
        // No end — simulate a crash. Start again.
        SessionState::start(dir.path(), None).unwrap();

        let store = LogStore::load(dir.path()).unwrap();
        assert_eq!(store.entries.len(), 2);
        let second = &store.entries[1];
        assert_eq!(second.kind, EntryKind::SessionStarted);
        assert!(second.payload.contains_key("recovered_from"));
    }

    #[test]
    fn require_fails_without_session() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            SessionState::require(dir.path()),
            Err(CadenceError::SessionNotFound)
        ));
    }

    #[test]
    fn end_counts_completed_tasks() {
        let dir = TempDir::new().unwrap();
        let cfg = EngineConfig::new("proj");
        let state = SessionState::start(dir.path(), None).unwrap();

        let mut payload = BTreeMap::new();
        payload.insert("task_id".to_string(), "1.2".to_string());
        LogStore::append(dir.path(), EntryKind::TaskCompleted, payload).unwrap();

        let checkpoint = state.end(dir.path(), &cfg, None).unwrap();
        assert_eq!(checkpoint.tasks_completed, 1);
    }
}
