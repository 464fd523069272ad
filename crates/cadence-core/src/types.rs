use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// EntryKind
// ---------------------------------------------------------------------------

/// The closed set of progress-log entry kinds. Each kind carries a fixed
/// required-field schema, checked before any write (see `log::append`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    SessionStarted,
    SessionEnded,
    TaskCompleted,
    TaskBlocked,
    DebugResolved,
    ScopeOverride,
}

impl EntryKind {
    pub fn all() -> &'static [EntryKind] {
        &[
            EntryKind::SessionStarted,
            EntryKind::SessionEnded,
            EntryKind::TaskCompleted,
            EntryKind::TaskBlocked,
            EntryKind::DebugResolved,
            EntryKind::ScopeOverride,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::SessionStarted => "session_started",
            EntryKind::SessionEnded => "session_ended",
            EntryKind::TaskCompleted => "task_completed",
            EntryKind::TaskBlocked => "task_blocked",
            EntryKind::DebugResolved => "debug_resolved",
            EntryKind::ScopeOverride => "scope_override",
        }
    }

    /// Payload fields that must be present (as non-empty strings) for an
    /// entry of this kind to be accepted.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            EntryKind::SessionStarted | EntryKind::SessionEnded => &[],
            EntryKind::TaskCompleted => &["task_id"],
            EntryKind::TaskBlocked => &["task_id", "reason"],
            EntryKind::DebugResolved => &["problem", "resolution"],
            EntryKind::ScopeOverride => &["requested_tasks"],
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryKind {
    type Err = crate::error::CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session_started" => Ok(EntryKind::SessionStarted),
            "session_ended" => Ok(EntryKind::SessionEnded),
            "task_completed" => Ok(EntryKind::TaskCompleted),
            "task_blocked" => Ok(EntryKind::TaskBlocked),
            "debug_resolved" => Ok(EntryKind::DebugResolved),
            "scope_override" => Ok(EntryKind::ScopeOverride),
            _ => Err(crate::error::CadenceError::Schema {
                kind: s.to_string(),
                reason: "unknown entry kind".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Task lifecycle. Transitions are enforced by `graph::TaskGraph::set_status`:
/// `pending → in_progress → {pass, blocked}`, `blocked → in_progress`.
/// `pass` is terminal for the attempt; reopening is a separate operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Pass,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Pass => "pass",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::error::CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "pass" => Ok(TaskStatus::Pass),
            "blocked" => Ok(TaskStatus::Blocked),
            _ => Err(crate::error::CadenceError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Parent,
    Subtask,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Parent => "parent",
            TaskKind::Subtask => "subtask",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

/// Where a deferred item should land when graduated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Promote into the live graph as a new wave task.
    WaveTask,
    /// Relocate verbatim into the external long-term backlog.
    RoadmapItem,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Destination::WaveTask => "wave_task",
            Destination::RoadmapItem => "roadmap_item",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Orchestrator run phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Planning,
    Executing,
    Verifying,
    Completing,
    Terminated,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Init,
            Phase::Planning,
            Phase::Executing,
            Phase::Verifying,
            Phase::Completing,
            Phase::Terminated,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Phase> {
        Phase::all().get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Planning => "planning",
            Phase::Executing => "executing",
            Phase::Verifying => "verifying",
            Phase::Completing => "completing",
            Phase::Terminated => "terminated",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = crate::error::CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Phase::Init),
            "planning" => Ok(Phase::Planning),
            "executing" => Ok(Phase::Executing),
            "verifying" => Ok(Phase::Verifying),
            "completing" => Ok(Phase::Completing),
            "terminated" => Ok(Phase::Terminated),
            _ => Err(crate::error::CadenceError::InvalidPhase(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
