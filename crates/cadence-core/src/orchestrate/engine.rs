//! The orchestrator: drives a task graph through
//! `init → planning → executing → verifying → completing → terminated`,
//! delegating one task at a time to a stateless worker and folding each
//! result back into the task graph store before moving on.
//!
//! Failure policy: storage-layer errors while executing become blocked-task
//! bookkeeping and the loop proceeds; errors in init or completing are fatal
//! and leave a checkpoint for resumption.

use crate::checkpoint::Checkpoint;
use crate::config::EngineConfig;
use crate::error::{CadenceError, Result};
use crate::graph::{GraphSummary, TaskGraph};
use crate::log::LogStore;
use crate::orchestrate::scope::ScopeGate;
use crate::orchestrate::worker::{Worker, WorkerError, WorkerReport, WorkerRequest, WorkerStatus};
use crate::task::{Task, TaskId};
use crate::types::{EntryKind, Phase, TaskStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Pass,
    Fail,
}

/// External full-verification collaborator (build/test runner).
pub trait Verifier {
    fn run_full_verification(&self) -> Result<VerifyOutcome>;
}

/// Runs a configured shell command; exit 0 is a pass.
pub struct ShellVerifier {
    command: String,
}

impl ShellVerifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Verifier for ShellVerifier {
    fn run_full_verification(&self) -> Result<VerifyOutcome> {
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .status()?;
        Ok(if status.success() {
            VerifyOutcome::Pass
        } else {
            VerifyOutcome::Fail
        })
    }
}

/// Used when no verify command is configured.
pub struct NoopVerifier;

impl Verifier for NoopVerifier {
    fn run_full_verification(&self) -> Result<VerifyOutcome> {
        Ok(VerifyOutcome::Pass)
    }
}

/// External version-control collaborator. The engine hands off a summary and
/// receives an opaque reference id; it never performs git operations itself.
pub trait Vcs {
    fn commit_and_open_request(&self, summary: &str) -> Result<String>;
}

pub struct NoopVcs;

impl Vcs for NoopVcs {
    fn commit_and_open_request(&self, _summary: &str) -> Result<String> {
        Ok(String::new())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Success {
        completed: Vec<TaskId>,
    },
    PartialWithBlockers {
        completed: Vec<TaskId>,
        blocked: Vec<TaskId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reopened: Option<TaskId>,
    },
    /// Fatal abort; a checkpoint was written for resumption.
    Aborted {
        reason: String,
    },
}

enum TaskResult {
    Passed,
    Blocked,
    AlreadyDone,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<'a> {
    root: &'a Path,
    cfg: &'a EngineConfig,
    worker: &'a dyn Worker,
    verifier: &'a dyn Verifier,
    vcs: &'a dyn Vcs,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        root: &'a Path,
        cfg: &'a EngineConfig,
        worker: &'a dyn Worker,
        verifier: &'a dyn Verifier,
        vcs: &'a dyn Vcs,
    ) -> Self {
        Self {
            root,
            cfg,
            worker,
            verifier,
            vcs,
        }
    }

    /// Drive one run over `spec`. `requested` may be empty, in which case the
    /// first unfinished top-level task is selected (single-task default).
    pub fn run(
        &self,
        spec: &str,
        requested: &[TaskId],
        override_scope: bool,
    ) -> Result<RunOutcome> {
        let run_started = Instant::now();

        // Init: the header is all the orchestrator needs to route work; full
        // descriptions stay on disk until a task is actually delegated.
        tracing::info!(phase = %Phase::Init, spec, "orchestrator starting");
        let header = match GraphSummary::load(self.root, spec) {
            Ok(h) => h,
            Err(e) => return self.abort(format!("init failed: {e}"), &run_started, 0),
        };
        tracing::debug!(total = header.summary.total, "loaded graph header");

        // Planning
        tracing::info!(phase = %Phase::Planning, "planning execution");
        let plan = match self.plan(spec, requested, override_scope) {
            Ok(p) => p,
            Err(e) => return self.abort(format!("planning failed: {e}"), &run_started, 0),
        };
        if plan.requires_confirmation {
            tracing::warn!("scope narrowed to a single task; re-run with an override to widen");
        }

        // Executing
        tracing::info!(phase = %Phase::Executing, tasks = plan.task_ids.len(), "executing plan");
        let mut completed: Vec<TaskId> = Vec::new();
        let mut blocked: Vec<TaskId> = Vec::new();
        let mut consecutive_blocked = 0usize;
        let mut last_passed: Option<TaskId> = None;

        for id in &plan.task_ids {
            let result = self.execute_one(spec, id);
            match result {
                Ok(TaskResult::Passed) => {
                    completed.push(id.clone());
                    last_passed = Some(id.clone());
                    consecutive_blocked = 0;
                }
                Ok(TaskResult::AlreadyDone) => {}
                Ok(TaskResult::Blocked) => {
                    blocked.push(id.clone());
                    consecutive_blocked += 1;
                }
                // Storage-layer errors are non-fatal here: recorded as a
                // blocker, loop proceeds to the next planned task.
                Err(e) => {
                    tracing::warn!(task = %id, error = %e, "task failed with storage error");
                    self.note_blocker(spec, id, &e.to_string());
                    blocked.push(id.clone());
                    consecutive_blocked += 1;
                }
            }
            if consecutive_blocked > self.cfg.orchestrator.abort_after_blocked {
                return self.abort(
                    format!(
                        "abort_threshold_exceeded: {consecutive_blocked} consecutive blocked tasks"
                    ),
                    &run_started,
                    completed.len(),
                );
            }
        }

        // Verifying
        tracing::info!(phase = %Phase::Verifying, "running full verification");
        let mut reopened: Option<TaskId> = None;
        let verify = self
            .verifier
            .run_full_verification()
            .unwrap_or(VerifyOutcome::Fail);
        if verify == VerifyOutcome::Fail {
            if let Some(last) = &last_passed {
                // The graph must not stay inconsistently marked pass when
                // verification says otherwise.
                if let Err(e) = self.reopen_task(spec, last) {
                    tracing::warn!(task = %last, error = %e, "failed to reopen task");
                } else {
                    reopened = Some(last.clone());
                }
            }
        }

        // Completing
        tracing::info!(phase = %Phase::Completing, "completing run");
        let outcome = if blocked.is_empty() && reopened.is_none() {
            RunOutcome::Success {
                completed: completed.clone(),
            }
        } else {
            RunOutcome::PartialWithBlockers {
                completed: completed.clone(),
                blocked: blocked.clone(),
                reopened: reopened.clone(),
            }
        };
        if let Err(e) = self.complete(spec, &outcome) {
            return self.abort(
                format!("completing failed: {e}"),
                &run_started,
                completed.len(),
            );
        }

        tracing::info!(phase = %Phase::Terminated, "orchestrator finished");
        Ok(outcome)
    }

    // ---------------------------------------------------------------------------
    // Phases
    // ---------------------------------------------------------------------------

    fn plan(
        &self,
        spec: &str,
        requested: &[TaskId],
        override_scope: bool,
    ) -> Result<crate::orchestrate::scope::ExecutionPlan> {
        let requested: Vec<TaskId> = if requested.is_empty() {
            let graph = TaskGraph::load(self.root, spec)?;
            graph
                .parents()
                .iter()
                .find(|t| t.status != TaskStatus::Pass)
                .map(|t| vec![t.id.clone()])
                .unwrap_or_default()
        } else {
            requested.to_vec()
        };
        ScopeGate::decide(self.root, &requested, override_scope)
    }

    fn execute_one(&self, spec: &str, id: &TaskId) -> Result<TaskResult> {
        let mut graph = TaskGraph::load(self.root, spec)?;
        let task = graph
            .task(id)
            .ok_or_else(|| CadenceError::TaskNotFound(id.to_string()))?
            .clone();

        if task.status == TaskStatus::Pass {
            tracing::debug!(task = %id, "already passed, skipping");
            return Ok(TaskResult::AlreadyDone);
        }
        if matches!(task.status, TaskStatus::Pending | TaskStatus::Blocked) {
            graph.set_status(id, TaskStatus::InProgress)?;
            graph.save(self.root)?;
        }

        let request = self.build_request(&graph, &task);
        let started = Instant::now();
        let attempts = 1 + self.cfg.orchestrator.worker_retries;
        let mut last_failure = String::from("worker reported failure");

        for attempt in 1..=attempts {
            tracing::debug!(task = %id, attempt, "delegating to worker");
            match self.worker.execute(&request) {
                Ok(report) if report.status == WorkerStatus::Pass => {
                    let minutes = (started.elapsed().as_secs() / 60) as u32;
                    self.incorporate_pass(&mut graph, id, &report, minutes)?;
                    return Ok(TaskResult::Passed);
                }
                Ok(report) if report.status == WorkerStatus::Blocked => {
                    // An external blocker; retrying the same bundle cannot help.
                    let reason = report
                        .blocker
                        .unwrap_or_else(|| "worker reported a blocker".to_string());
                    self.incorporate_blocked(&mut graph, id, &reason)?;
                    return Ok(TaskResult::Blocked);
                }
                Ok(report) => {
                    last_failure = report
                        .notes
                        .unwrap_or_else(|| "worker reported failure".to_string());
                }
                Err(WorkerError::Timeout) => {
                    last_failure = "worker timed out".to_string();
                }
                Err(e) => {
                    last_failure = e.to_string();
                }
            }
            tracing::warn!(task = %id, attempt, reason = %last_failure, "worker attempt failed");
        }

        self.incorporate_blocked(&mut graph, id, &last_failure)?;
        Ok(TaskResult::Blocked)
    }

    fn complete(&self, spec: &str, outcome: &RunOutcome) -> Result<()> {
        let header = GraphSummary::load(self.root, spec)?;
        let summary_line = format!(
            "{spec}: {}/{} tasks complete, {} blocked",
            header.summary.completed, header.summary.total, header.summary.blocked
        );
        let reference = self.vcs.commit_and_open_request(&summary_line)?;

        let mut payload = BTreeMap::new();
        payload.insert("spec".to_string(), spec.to_string());
        payload.insert("summary".to_string(), summary_line);
        payload.insert(
            "outcome".to_string(),
            match outcome {
                RunOutcome::Success { .. } => "success".to_string(),
                RunOutcome::PartialWithBlockers { .. } => "partial".to_string(),
                RunOutcome::Aborted { reason } => format!("aborted: {reason}"),
            },
        );
        if !reference.is_empty() {
            payload.insert("reference".to_string(), reference);
        }
        LogStore::append(self.root, EntryKind::SessionEnded, payload)?;
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Result incorporation
    // ---------------------------------------------------------------------------

    fn incorporate_pass(
        &self,
        graph: &mut TaskGraph,
        id: &TaskId,
        report: &WorkerReport,
        minutes: u32,
    ) -> Result<()> {
        // The worker executed the whole unit, subtasks included.
        let child_ids: Vec<TaskId> = graph.children(id).iter().map(|c| c.id.clone()).collect();
        for child in &child_ids {
            let status = graph.task(child).map(|c| c.status);
            match status {
                Some(TaskStatus::Pending) | Some(TaskStatus::Blocked) => {
                    graph.set_status(child, TaskStatus::InProgress)?;
                    graph.set_status(child, TaskStatus::Pass)?;
                }
                Some(TaskStatus::InProgress) => {
                    graph.set_status(child, TaskStatus::Pass)?;
                }
                _ => {}
            }
        }

        {
            let task = graph
                .tasks
                .iter_mut()
                .find(|t| &t.id == id)
                .ok_or_else(|| CadenceError::TaskNotFound(id.to_string()))?;
            task.artifacts
                .files_modified
                .extend(report.files_modified.iter().cloned());
            task.artifacts
                .files_created
                .extend(report.files_created.iter().cloned());
            task.artifacts
                .test_files
                .extend(report.test_results.iter().cloned());
            task.duration_minutes = Some(minutes);
            if let Some(notes) = &report.notes {
                task.notes = Some(notes.clone());
            }
        }

        graph.set_status(id, TaskStatus::Pass)?;
        graph.save(self.root)?;

        let mut payload = BTreeMap::new();
        payload.insert("task_id".to_string(), id.to_string());
        payload.insert("duration_minutes".to_string(), minutes.to_string());
        LogStore::append(self.root, EntryKind::TaskCompleted, payload)?;
        Ok(())
    }

    fn incorporate_blocked(&self, graph: &mut TaskGraph, id: &TaskId, reason: &str) -> Result<()> {
        graph.set_notes(id, reason)?;
        graph.set_status(id, TaskStatus::Blocked)?;
        graph.save(self.root)?;

        let mut payload = BTreeMap::new();
        payload.insert("task_id".to_string(), id.to_string());
        payload.insert("reason".to_string(), reason.to_string());
        LogStore::append(self.root, EntryKind::TaskBlocked, payload)?;
        Ok(())
    }

    /// Best-effort blocker note when even the storage layer misbehaved.
    fn note_blocker(&self, spec: &str, id: &TaskId, reason: &str) {
        let result = TaskGraph::load(self.root, spec).and_then(|mut graph| {
            let _ = graph.set_notes(id, reason);
            if graph.task(id).map(|t| t.status) == Some(TaskStatus::InProgress) {
                let _ = graph.set_status(id, TaskStatus::Blocked);
            }
            graph.save(self.root)
        });
        if let Err(e) = result {
            tracing::warn!(task = %id, error = %e, "could not record blocker");
        }
    }

    fn reopen_task(&self, spec: &str, id: &TaskId) -> Result<()> {
        let mut graph = TaskGraph::load(self.root, spec)?;
        graph.reopen(id)?;
        graph.save(self.root)
    }

    // ---------------------------------------------------------------------------
    // Bundles
    // ---------------------------------------------------------------------------

    /// Minimal, filtered context: the task itself, its subtask descriptions,
    /// a one-line progress summary, and only the references/standards whose
    /// paths intersect the task's declared file scope.
    fn build_request(&self, graph: &TaskGraph, task: &Task) -> WorkerRequest {
        let subtasks = graph
            .children(&task.id)
            .iter()
            .map(|c| c.description.clone())
            .collect();
        WorkerRequest {
            task_id: task.id.clone(),
            description: task.description.clone(),
            subtasks,
            context_summary: format!(
                "{}: {}/{} tasks complete",
                graph.spec, graph.summary.completed, graph.summary.total
            ),
            filtered_references: filter_by_scope(&self.cfg.references, &task.file_scope),
            relevant_standards: filter_by_scope(&self.cfg.standards, &task.file_scope),
        }
    }

    // ---------------------------------------------------------------------------
    // Abort path
    // ---------------------------------------------------------------------------

    /// Every fatal abort leaves a checkpoint carrying the run's actual
    /// progress, and a machine-readable reason.
    fn abort(
        &self,
        reason: String,
        run_started: &Instant,
        tasks_completed: usize,
    ) -> Result<RunOutcome> {
        tracing::error!(%reason, "aborting orchestrator run");
        let minutes = (run_started.elapsed().as_secs() / 60) as i64;
        Checkpoint::new(None, minutes, tasks_completed).write(self.root, &self.cfg.checkpoints)?;
        Ok(RunOutcome::Aborted { reason })
    }
}

/// An empty scope admits everything; otherwise a reference is relevant when
/// it shares a path component with the scope.
fn filter_by_scope(paths: &[String], scope: &[String]) -> Vec<String> {
    if scope.is_empty() {
        return paths.to_vec();
    }
    let components: Vec<&str> = scope
        .iter()
        .flat_map(|s| s.split('/'))
        .filter(|c| !c.is_empty())
        .collect();
    paths
        .iter()
        .filter(|p| components.iter().any(|c| p.contains(c)))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
