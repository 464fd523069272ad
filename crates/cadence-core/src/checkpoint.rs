//! Durable session snapshots. One file per checkpoint, named by creation
//! timestamp; a bounded ring (default 10) is kept by deleting the oldest on
//! overflow. Checkpoints are immutable once written — resumption reads the
//! most recent one.

use crate::config::CheckpointConfig;
use crate::error::Result;
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub created_at: DateTime<Utc>,
    /// Opaque version-control pointer (e.g. a commit hash). The engine never
    /// interprets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_revision: Option<String>,
    pub session_duration_minutes: i64,
    pub tasks_completed: usize,
}

impl Checkpoint {
    pub fn new(
        external_revision: Option<String>,
        session_duration_minutes: i64,
        tasks_completed: usize,
    ) -> Self {
        Self {
            created_at: Utc::now(),
            external_revision,
            session_duration_minutes,
            tasks_completed,
        }
    }

    fn filename(&self) -> String {
        // Millisecond precision keeps names unique within a session.
        format!(
            "checkpoint-{}.yaml",
            self.created_at.format("%Y%m%dT%H%M%S%3fZ")
        )
    }

    /// Write this checkpoint, then prune the ring down to `cfg.retain`.
    pub fn write(&self, root: &Path, cfg: &CheckpointConfig) -> Result<PathBuf> {
        let path = paths::checkpoints_dir(root).join(self.filename());
        crate::io::atomic_write_yaml(&path, self)?;
        prune(root, cfg.retain)?;
        tracing::debug!(path = %path.display(), "checkpoint written");
        Ok(path)
    }

    /// All checkpoints, oldest first. Timestamp-named files sort
    /// lexicographically in creation order.
    pub fn list(root: &Path) -> Result<Vec<(PathBuf, Checkpoint)>> {
        let dir = paths::checkpoints_dir(root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("checkpoint-") && n.ends_with(".yaml"))
            })
            .collect();
        paths.sort();

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let cp: Checkpoint = crate::io::read_yaml(&path)?;
            out.push((path, cp));
        }
        Ok(out)
    }

    pub fn latest(root: &Path) -> Result<Option<Checkpoint>> {
        Ok(Self::list(root)?.pop().map(|(_, cp)| cp))
    }
}

fn prune(root: &Path, retain: usize) -> Result<()> {
    let all = Checkpoint::list(root)?;
    if all.len() <= retain {
        return Ok(());
    }
    for (path, _) in &all[..all.len() - retain] {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let cp = Checkpoint::new(Some("abc123".to_string()), 42, 3);
        cp.write(dir.path(), &CheckpointConfig::default()).unwrap();

        let latest = Checkpoint::latest(dir.path()).unwrap().unwrap();
        assert_eq!(latest, cp);
    }

    #[test]
    fn latest_of_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(Checkpoint::latest(dir.path()).unwrap().is_none());
    }

    #[test]
    fn ring_discards_oldest_beyond_retention() {
        let dir = TempDir::new().unwrap();
        let cfg = CheckpointConfig { retain: 3 };
        let base = Utc::now();
        for i in 0..5 {
            let mut cp = Checkpoint::new(None, i, i as usize);
            cp.created_at = base + Duration::milliseconds(i * 10);
            cp.write(dir.path(), &cfg).unwrap();
        }

        let all = Checkpoint::list(dir.path()).unwrap();
        assert_eq!(all.len(), 3);
        // Oldest two are gone; the newest survives.
        assert_eq!(all.last().unwrap().1.session_duration_minutes, 4);
        assert_eq!(all.first().unwrap().1.session_duration_minutes, 2);
    }
}
