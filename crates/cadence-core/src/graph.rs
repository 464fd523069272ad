//! Canonical task graph store: one `tasks.yaml` per spec, atomic-replace
//! writes, validated invariants, and the task status state machine.

use crate::error::{CadenceError, Result};
use crate::paths;
use crate::task::{Task, TaskId};
use crate::types::{Destination, TaskKind, TaskStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// DeferredItem
// ---------------------------------------------------------------------------

/// Deferred ("future") work captured during execution — e.g. a review comment
/// that should become a task later. Graduation moves these out of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredItem {
    pub id: String,
    pub description: String,
    /// Where the item came from, preserved verbatim through graduation.
    pub origin: String,
    pub destination: Destination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_context: Option<String>,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Counters derived from the task collection. Never incrementally maintained;
/// always recomputed after a mutation, so it cannot drift.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub pending: usize,
}

pub fn summarize(tasks: &[Task]) -> Summary {
    let mut s = Summary {
        total: tasks.len(),
        ..Summary::default()
    };
    for t in tasks {
        match t.status {
            TaskStatus::Pass => s.completed += 1,
            TaskStatus::InProgress => s.in_progress += 1,
            TaskStatus::Blocked => s.blocked += 1,
            TaskStatus::Pending => s.pending += 1,
        }
    }
    s
}

// ---------------------------------------------------------------------------
// GraphSummary
// ---------------------------------------------------------------------------

/// Header-only view of a graph file. The orchestrator's init phase loads this
/// instead of the full graph so it never holds task descriptions it does not
/// need.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSummary {
    #[serde(default = "default_graph_version")]
    pub version: String,
    pub spec: String,
    #[serde(default)]
    pub summary: Summary,
}

impl GraphSummary {
    pub fn load(root: &Path, spec: &str) -> Result<Self> {
        paths::validate_spec_id(spec)?;
        let path = paths::graph_path(root, spec);
        if !path.exists() {
            return Err(CadenceError::SpecNotFound(spec.to_string()));
        }
        crate::io::read_yaml(&path)
    }
}

fn default_graph_version() -> String {
    "4.0".to_string()
}

// ---------------------------------------------------------------------------
// TaskGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    /// Schema version string; the leading integer gates engine features.
    /// Graduation requires major ≥ 3. Majors other than 3 and 4 are readable
    /// and renderable but never mutated.
    #[serde(default = "default_graph_version")]
    pub version: String,
    pub spec: String,
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub future_tasks: Vec<DeferredItem>,
    #[serde(default)]
    pub summary: Summary,
    #[serde(skip)]
    index: BTreeMap<TaskId, usize>,
}

impl TaskGraph {
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            version: default_graph_version(),
            spec: spec.into(),
            tasks: Vec::new(),
            future_tasks: Vec::new(),
            summary: Summary::default(),
            index: BTreeMap::new(),
        }
    }

    // ---------------------------------------------------------------------------
    // Version gating
    // ---------------------------------------------------------------------------

    pub fn major_version(&self) -> Option<u32> {
        let head = self.version.split('.').next()?;
        head.parse().ok()
    }

    pub fn is_known_version(&self) -> bool {
        matches!(self.major_version(), Some(3) | Some(4))
    }

    pub fn supports_graduation(&self) -> bool {
        matches!(self.major_version(), Some(v) if v >= 3)
    }

    fn ensure_mutable(&self, operation: &str) -> Result<()> {
        if self.is_known_version() {
            return Ok(());
        }
        Err(CadenceError::UnsupportedVersion {
            version: self.version.clone(),
            operation: operation.to_string(),
        })
    }

    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    pub fn load(root: &Path, spec: &str) -> Result<Self> {
        paths::validate_spec_id(spec)?;
        let path = paths::graph_path(root, spec);
        if !path.exists() {
            return Err(CadenceError::SpecNotFound(spec.to_string()));
        }
        let mut graph: TaskGraph = crate::io::read_yaml(&path)?;
        graph.rebuild_index();
        graph.validate()?;
        graph.summary = summarize(&graph.tasks);
        Ok(graph)
    }

    pub fn save(&mut self, root: &Path) -> Result<()> {
        self.rebuild_index();
        self.validate()?;
        self.summary = summarize(&self.tasks);
        crate::io::atomic_write_yaml(&paths::graph_path(root, &self.spec), self)
    }

    // ---------------------------------------------------------------------------
    // Invariants
    // ---------------------------------------------------------------------------

    /// Unique task ids, every subtask's parent present, future ids disjoint
    /// from live ids.
    pub fn validate(&self) -> Result<()> {
        let mut seen: BTreeSet<&TaskId> = BTreeSet::new();
        for task in &self.tasks {
            if !seen.insert(&task.id) {
                return Err(CadenceError::Validation(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }
        for task in &self.tasks {
            if let Some(parent) = task.id.parent() {
                if !seen.contains(&parent) {
                    return Err(CadenceError::Validation(format!(
                        "subtask '{}' has no parent '{}'",
                        task.id, parent
                    )));
                }
            }
        }
        let live: BTreeSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();
        for item in &self.future_tasks {
            if live.contains(item.id.as_str()) {
                return Err(CadenceError::Validation(format!(
                    "future task id '{}' collides with a live task",
                    item.id
                )));
            }
        }
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
    }

    // ---------------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------------

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    fn task_mut(&mut self, id: &TaskId) -> Result<&mut Task> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.tasks[i]),
            None => Err(CadenceError::TaskNotFound(id.to_string())),
        }
    }

    /// Direct children of `id`, in stored order.
    pub fn children(&self, id: &TaskId) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.id.is_child_of(id)).collect()
    }

    /// Top-level tasks in stored order.
    pub fn parents(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.id.is_top_level()).collect()
    }

    /// Completion percentage for a parent, derived from children. A parent
    /// without children reflects its own status.
    pub fn progress_percent(&self, id: &TaskId) -> Option<u8> {
        let task = self.task(id)?;
        let children = self.children(id);
        if children.is_empty() {
            return Some(if task.status == TaskStatus::Pass { 100 } else { 0 });
        }
        let done = children
            .iter()
            .filter(|c| c.status == TaskStatus::Pass)
            .count();
        Some(((done * 100) / children.len()) as u8)
    }

    // ---------------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------------

    pub fn add_task(&mut self, task: Task) -> Result<()> {
        self.ensure_mutable("add_task")?;
        if self.index.contains_key(&task.id) {
            return Err(CadenceError::Validation(format!(
                "duplicate task id '{}'",
                task.id
            )));
        }
        self.tasks.push(task);
        self.rebuild_index();
        self.summary = summarize(&self.tasks);
        Ok(())
    }

    /// Enforce the status state machine:
    /// `pending → in_progress → {pass, blocked}`, `blocked → in_progress`.
    ///
    /// A parent may only pass once every child passes and its artifacts
    /// record is non-empty.
    pub fn set_status(&mut self, id: &TaskId, new: TaskStatus) -> Result<()> {
        self.ensure_mutable("set_status")?;
        let current = self
            .task(id)
            .ok_or_else(|| CadenceError::TaskNotFound(id.to_string()))?
            .status;

        let allowed = matches!(
            (current, new),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Pass)
                | (TaskStatus::InProgress, TaskStatus::Blocked)
                | (TaskStatus::Blocked, TaskStatus::InProgress)
        );
        if !allowed {
            return Err(CadenceError::InvalidTransition {
                from: current.to_string(),
                to: new.to_string(),
                reason: "not a legal status transition".to_string(),
            });
        }

        if new == TaskStatus::Pass {
            let task = self.task(id).expect("checked above");
            if task.kind == TaskKind::Parent {
                let children = self.children(id);
                if children.iter().any(|c| c.status != TaskStatus::Pass) {
                    return Err(CadenceError::InvalidTransition {
                        from: current.to_string(),
                        to: new.to_string(),
                        reason: format!("task '{id}' has subtasks that have not passed"),
                    });
                }
                if task.artifacts.is_empty() {
                    return Err(CadenceError::IncompleteArtifacts(id.to_string()));
                }
            }
        }

        let task = self.task_mut(id)?;
        task.status = new;
        match new {
            TaskStatus::InProgress => task.attempts += 1,
            TaskStatus::Pass => task.completed_at = Some(Utc::now()),
            _ => {}
        }
        self.summary = summarize(&self.tasks);
        Ok(())
    }

    /// Explicit operator action: put a passed task back in progress. Not
    /// reachable through `set_status`.
    pub fn reopen(&mut self, id: &TaskId) -> Result<()> {
        self.ensure_mutable("reopen")?;
        let task = self.task_mut(id)?;
        if task.status != TaskStatus::Pass {
            return Err(CadenceError::InvalidTransition {
                from: task.status.to_string(),
                to: TaskStatus::InProgress.to_string(),
                reason: "only passed tasks can be reopened".to_string(),
            });
        }
        task.status = TaskStatus::InProgress;
        task.attempts += 1;
        task.completed_at = None;
        self.summary = summarize(&self.tasks);
        Ok(())
    }

    pub fn set_notes(&mut self, id: &TaskId, notes: impl Into<String>) -> Result<()> {
        self.ensure_mutable("set_notes")?;
        self.task_mut(id)?.notes = Some(notes.into());
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Allocation helpers (used by graduation)
    // ---------------------------------------------------------------------------

    /// Lowest unused wave number, starting at 1. Covers both dense
    /// (1,2 → 3) and sparse (1,3 → 2) wave sets.
    pub fn next_wave(&self) -> u32 {
        let used: BTreeSet<u32> = self.tasks.iter().filter_map(|t| t.wave).collect();
        (1..).find(|w| !used.contains(w)).expect("unbounded range")
    }

    /// Fresh top-level id: one past the highest numeric top-level id.
    pub fn next_top_level_id(&self) -> TaskId {
        let max = self
            .tasks
            .iter()
            .filter(|t| t.id.is_top_level())
            .filter_map(|t| t.id.top_level_number())
            .max()
            .unwrap_or(0);
        TaskId::new((max + 1).to_string())
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
