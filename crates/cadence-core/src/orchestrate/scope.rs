//! Scope gate: single-task execution is the default policy. Widening a run
//! to multiple tasks requires an explicit override, and every override is
//! logged as a `scope_override` entry — the audit trail of deviations is
//! mandatory, not best-effort.

use crate::error::Result;
use crate::log::LogStore;
use crate::task::TaskId;
use crate::types::EntryKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub task_ids: Vec<TaskId>,
    /// Set when the request was narrowed to one task; the caller should ask
    /// for confirmation (or re-run with an override) to execute the rest.
    pub requires_confirmation: bool,
}

pub struct ScopeGate;

impl ScopeGate {
    /// Decide the execution plan for a set of requested task ids.
    ///
    /// One task (or none) passes through unchanged. More than one without an
    /// override collapses to the first, flagged for confirmation. With an
    /// override the full plan is returned and the override is logged.
    pub fn decide(
        root: &Path,
        requested: &[TaskId],
        override_scope: bool,
    ) -> Result<ExecutionPlan> {
        if requested.len() <= 1 {
            return Ok(ExecutionPlan {
                task_ids: requested.to_vec(),
                requires_confirmation: false,
            });
        }

        if !override_scope {
            tracing::info!(
                requested = requested.len(),
                "scope gate narrowed plan to a single task"
            );
            return Ok(ExecutionPlan {
                task_ids: vec![requested[0].clone()],
                requires_confirmation: true,
            });
        }

        let mut payload = BTreeMap::new();
        payload.insert(
            "requested_tasks".to_string(),
            requested
                .iter()
                .map(TaskId::to_string)
                .collect::<Vec<_>>()
                .join(","),
        );
        LogStore::append(root, EntryKind::ScopeOverride, payload)?;

        Ok(ExecutionPlan {
            task_ids: requested.to_vec(),
            requires_confirmation: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids(list: &[&str]) -> Vec<TaskId> {
        list.iter().map(|s| TaskId::new(*s)).collect()
    }

    #[test]
    fn single_task_passes_through() {
        let dir = TempDir::new().unwrap();
        let plan = ScopeGate::decide(dir.path(), &ids(&["1"]), false).unwrap();
        assert_eq!(plan.task_ids, ids(&["1"]));
        assert!(!plan.requires_confirmation);
        // no override entry appended
        assert!(LogStore::load(dir.path()).unwrap().entries.is_empty());
    }

    #[test]
    fn multi_task_without_override_narrows_to_first() {
        let dir = TempDir::new().unwrap();
        let plan = ScopeGate::decide(dir.path(), &ids(&["1", "2", "3"]), false).unwrap();
        assert_eq!(plan.task_ids, ids(&["1"]));
        assert!(plan.requires_confirmation);
        assert!(LogStore::load(dir.path()).unwrap().entries.is_empty());
    }

    #[test]
    fn override_returns_full_plan_and_logs_exactly_once() {
        let dir = TempDir::new().unwrap();
        let plan = ScopeGate::decide(dir.path(), &ids(&["1", "2", "3"]), true).unwrap();
        assert_eq!(plan.task_ids, ids(&["1", "2", "3"]));
        assert!(!plan.requires_confirmation);

        let store = LogStore::load(dir.path()).unwrap();
        let overrides: Vec<_> = store
            .entries
            .iter()
            .filter(|e| e.kind == EntryKind::ScopeOverride)
            .collect();
        assert_eq!(overrides.len(), 1);
        assert_eq!(
            overrides[0].payload.get("requested_tasks").unwrap(),
            "1,2,3"
        );
    }

    #[test]
    fn empty_request_yields_empty_plan() {
        let dir = TempDir::new().unwrap();
        let plan = ScopeGate::decide(dir.path(), &[], false).unwrap();
        assert!(plan.task_ids.is_empty());
        assert!(!plan.requires_confirmation);
    }
}
