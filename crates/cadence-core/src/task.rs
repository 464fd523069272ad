use crate::types::{TaskKind, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Hierarchical task id: `"3"` is a parent, `"3.2"` its second subtask.
/// Parent/child relation is encoded structurally in the id; all parsing of
/// the dotted form lives here rather than at call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The enclosing parent id, if any. `"3.2"` → `"3"`, `"3"` → `None`.
    pub fn parent(&self) -> Option<TaskId> {
        self.0.rsplit_once('.').map(|(head, _)| TaskId::new(head))
    }

    pub fn is_top_level(&self) -> bool {
        !self.0.contains('.')
    }

    pub fn is_child_of(&self, other: &TaskId) -> bool {
        self.parent().as_ref() == Some(other)
    }

    /// Leading integer of a top-level id, used for fresh-id allocation.
    pub fn top_level_number(&self) -> Option<u64> {
        self.segments().next().and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId::new(s)
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// What a completed task produced. Required non-empty before a parent task
/// may pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_created: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_files: Vec<String>,
}

impl Artifacts {
    pub fn is_empty(&self) -> bool {
        self.files_created.is_empty()
            && self.files_modified.is_empty()
            && self.exports.is_empty()
            && self.test_files.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Artifacts::is_empty")]
    pub artifacts: Artifacts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave: Option<u32>,
    /// Subtask breakdown not yet materialized; a downstream planning step
    /// expands this task before execution.
    #[serde(default)]
    pub needs_expansion: bool,
    /// Deferred-item id this task was graduated from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_from: Option<String>,
    /// Declared file scope; filters references/standards in worker bundles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_scope: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, kind: TaskKind, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            status: TaskStatus::Pending,
            attempts: 0,
            completed_at: None,
            duration_minutes: None,
            notes: None,
            artifacts: Artifacts::default(),
            wave: None,
            needs_expansion: false,
            promoted_from: None,
            file_scope: Vec::new(),
        }
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_subtask() {
        assert_eq!(TaskId::new("3.2").parent(), Some(TaskId::new("3")));
        assert_eq!(TaskId::new("3.2.1").parent(), Some(TaskId::new("3.2")));
        assert_eq!(TaskId::new("3").parent(), None);
    }

    #[test]
    fn child_relation() {
        assert!(TaskId::new("1.2").is_child_of(&TaskId::new("1")));
        assert!(!TaskId::new("1.2.3").is_child_of(&TaskId::new("1")));
        assert!(!TaskId::new("11.2").is_child_of(&TaskId::new("1")));
    }

    #[test]
    fn top_level_number() {
        assert_eq!(TaskId::new("7").top_level_number(), Some(7));
        assert_eq!(TaskId::new("7.3").top_level_number(), Some(7));
        assert_eq!(TaskId::new("7.2").top_level_number(), Some(7));
        assert_eq!(TaskId::new("x").top_level_number(), None);
    }

    #[test]
    fn artifacts_emptiness() {
        let mut a = Artifacts::default();
        assert!(a.is_empty());
        a.files_modified.push("src/lib.rs".to_string());
        assert!(!a.is_empty());
    }

    #[test]
    fn task_serde_skips_defaults() {
        let task = Task::new("1", TaskKind::Parent, "Build the parser");
        let yaml = serde_yaml::to_string(&task).unwrap();
        assert!(!yaml.contains("completed_at"));
        assert!(!yaml.contains("artifacts"));
        assert!(!yaml.contains("promoted_from"));
        let parsed: Task = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, task);
    }
}
