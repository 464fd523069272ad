use crate::error::{CadenceError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CADENCE_DIR: &str = ".cadence";
pub const SPECS_DIR: &str = ".cadence/specs";
pub const ARCHIVE_DIR: &str = ".cadence/archive";
pub const CHECKPOINTS_DIR: &str = ".cadence/checkpoints";

pub const CONFIG_FILE: &str = ".cadence/config.yaml";
pub const PROGRESS_FILE: &str = ".cadence/progress.yaml";
pub const SESSION_FILE: &str = ".cadence/session.yaml";
pub const ROADMAP_FILE: &str = ".cadence/roadmap.md";

pub const GRAPH_FILE: &str = "tasks.yaml";
pub const RENDERED_FILE: &str = "tasks.md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn cadence_dir(root: &Path) -> PathBuf {
    root.join(CADENCE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn progress_path(root: &Path) -> PathBuf {
    root.join(PROGRESS_FILE)
}

pub fn session_path(root: &Path) -> PathBuf {
    root.join(SESSION_FILE)
}

pub fn roadmap_path(root: &Path) -> PathBuf {
    root.join(ROADMAP_FILE)
}

pub fn archive_dir(root: &Path) -> PathBuf {
    root.join(ARCHIVE_DIR)
}

/// Archive partition for one calendar month, keyed `YYYY-MM`.
pub fn archive_path(root: &Path, period: &str) -> PathBuf {
    archive_dir(root).join(format!("{period}.yaml"))
}

pub fn checkpoints_dir(root: &Path) -> PathBuf {
    root.join(CHECKPOINTS_DIR)
}

pub fn spec_dir(root: &Path, spec: &str) -> PathBuf {
    root.join(SPECS_DIR).join(spec)
}

pub fn graph_path(root: &Path, spec: &str) -> PathBuf {
    spec_dir(root, spec).join(GRAPH_FILE)
}

pub fn rendered_path(root: &Path, spec: &str) -> PathBuf {
    spec_dir(root, spec).join(RENDERED_FILE)
}

// ---------------------------------------------------------------------------
// Spec id validation
// ---------------------------------------------------------------------------

static SPEC_ID_RE: OnceLock<Regex> = OnceLock::new();

fn spec_id_re() -> &'static Regex {
    SPEC_ID_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

pub fn validate_spec_id(spec: &str) -> Result<()> {
    if spec.is_empty() || spec.len() > 64 || !spec_id_re().is_match(spec) {
        return Err(CadenceError::InvalidSpecId(spec.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_spec_ids() {
        for spec in ["auth-rework", "a", "wave-2-cleanup", "x1"] {
            validate_spec_id(spec).unwrap_or_else(|_| panic!("expected valid: {spec}"));
        }
    }

    #[test]
    fn invalid_spec_ids() {
        for spec in ["", "-leading", "trailing-", "has spaces", "UPPER", "a_b"] {
            assert!(validate_spec_id(spec).is_err(), "expected invalid: {spec}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            progress_path(root),
            PathBuf::from("/tmp/proj/.cadence/progress.yaml")
        );
        assert_eq!(
            graph_path(root, "auth-rework"),
            PathBuf::from("/tmp/proj/.cadence/specs/auth-rework/tasks.yaml")
        );
        assert_eq!(
            archive_path(root, "2026-07"),
            PathBuf::from("/tmp/proj/.cadence/archive/2026-07.yaml")
        );
    }
}
