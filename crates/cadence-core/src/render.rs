//! Deterministic projection of a task graph and progress log into markdown.
//!
//! `render` is a pure function: identical inputs produce byte-identical
//! output. No wall clock, no unordered iteration — task order is
//! hierarchical (stored order, children under their parent), log order is
//! chronological descending. The rendered file is derived state: regenerated
//! on demand and never hand-edited.

use crate::graph::TaskGraph;
use crate::log::{LogEntry, LogStore};
use crate::task::TaskId;
use crate::types::TaskStatus;
use std::fmt::Write;

const GENERATED_HEADER: &str =
    "<!-- Generated by cadence; do not edit. Regenerate with `cadence render`. -->";

/// How many log entries the rendered view shows.
const RECENT_ENTRIES: usize = 20;

pub fn render(graph: &TaskGraph, log: &LogStore) -> String {
    let mut out = String::new();

    writeln!(out, "{GENERATED_HEADER}").unwrap();
    writeln!(out, "# Tasks — {}", graph.spec).unwrap();
    writeln!(out).unwrap();
    writeln!(out, "Schema version: {}", graph.version).unwrap();
    writeln!(out).unwrap();
    let s = &graph.summary;
    writeln!(
        out,
        "Summary: {} total, {} completed, {} in progress, {} blocked, {} pending",
        s.total, s.completed, s.in_progress, s.blocked, s.pending
    )
    .unwrap();

    writeln!(out).unwrap();
    writeln!(out, "## Tasks").unwrap();
    writeln!(out).unwrap();
    for parent in graph.parents() {
        let pct = graph.progress_percent(&parent.id).unwrap_or(0);
        let mut line = format!(
            "- {} **{}** — {} [{}] ({pct}%",
            marker(parent.status),
            parent.id,
            parent.description,
            parent.status
        );
        if parent.attempts > 1 {
            write!(line, ", {} attempts", parent.attempts).unwrap();
        }
        if let Some(wave) = parent.wave {
            write!(line, ", wave {wave}").unwrap();
        }
        line.push(')');
        writeln!(out, "{line}").unwrap();
        if parent.needs_expansion {
            writeln!(out, "  - _subtasks not yet expanded_").unwrap();
        }
        write_subtasks(&mut out, graph, &parent.id, 1);
        if let Some(notes) = &parent.notes {
            writeln!(out, "  - note: {notes}").unwrap();
        }
    }

    if !graph.future_tasks.is_empty() {
        writeln!(out).unwrap();
        writeln!(out, "## Future tasks").unwrap();
        writeln!(out).unwrap();
        for item in &graph.future_tasks {
            writeln!(
                out,
                "- {} ({}) {} — from {}",
                item.id, item.destination, item.description, item.origin
            )
            .unwrap();
        }
    }

    writeln!(out).unwrap();
    writeln!(out, "## Recent progress").unwrap();
    writeln!(out).unwrap();
    if log.entries.is_empty() {
        writeln!(out, "_no entries_").unwrap();
    } else {
        // Insertion order equals timestamp order for engine-appended entries,
        // so reversing gives chronological descending.
        for entry in log.recent(RECENT_ENTRIES).iter().rev() {
            writeln!(out, "{}", entry_line(entry)).unwrap();
        }
    }

    out
}

/// Subtasks at any depth, indented under their parent.
fn write_subtasks(out: &mut String, graph: &TaskGraph, id: &TaskId, depth: usize) {
    for child in graph.children(id) {
        let mut line = format!(
            "{}- {} {} — {} [{}]",
            "  ".repeat(depth),
            marker(child.status),
            child.id,
            child.description,
            child.status
        );
        if let Some(notes) = &child.notes {
            write!(line, " — {notes}").unwrap();
        }
        writeln!(out, "{line}").unwrap();
        write_subtasks(out, graph, &child.id, depth + 1);
    }
}

fn marker(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pass => "[x]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Blocked => "[!]",
        TaskStatus::Pending => "[ ]",
    }
}

fn entry_line(entry: &LogEntry) -> String {
    let mut line = format!(
        "- {} — {}",
        entry.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
        entry.kind
    );
    if !entry.payload.is_empty() {
        // BTreeMap iteration is key-ordered, keeping output stable.
        let fields: Vec<String> = entry
            .payload
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        line.push_str(&format!(" ({})", fields.join(", ")));
    }
    line
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogEntry;
    use crate::task::Task;
    use crate::types::{EntryKind, TaskKind};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn fixture() -> (TaskGraph, LogStore) {
        let mut graph = TaskGraph::new("auth-rework");
        graph
            .add_task(Task::new("1", TaskKind::Parent, "Rework auth"))
            .unwrap();
        graph
            .add_task(Task::new("1.1", TaskKind::Subtask, "Add token refresh"))
            .unwrap();
        graph
            .add_task(Task::new("1.2", TaskKind::Subtask, "Rotate secrets"))
            .unwrap();

        let mut log = LogStore::new();
        for (i, task) in ["1.1", "1.2"].iter().enumerate() {
            let ts = Utc.with_ymd_and_hms(2026, 8, 20, 10, i as u32, 0).unwrap();
            let mut payload = BTreeMap::new();
            payload.insert("task_id".to_string(), task.to_string());
            log.entries
                .push(LogEntry::new(EntryKind::TaskCompleted, payload, ts, (i + 1) as u64));
        }
        (graph, log)
    }

    #[test]
    fn render_is_deterministic() {
        let (graph, log) = fixture();
        assert_eq!(render(&graph, &log), render(&graph, &log));
    }

    #[test]
    fn render_shows_tasks_and_statuses() {
        let (mut graph, log) = fixture();
        let id = crate::task::TaskId::new("1.2");
        graph.set_status(&id, TaskStatus::InProgress).unwrap();
        graph.set_status(&id, TaskStatus::Pass).unwrap();

        let text = render(&graph, &log);
        assert!(text.contains("1.2"));
        assert!(text.contains("[x] 1.2 — Rotate secrets [pass]"));
        assert!(text.contains("task_completed (task_id=1.2)"));
    }

    #[test]
    fn log_entries_render_descending() {
        let (graph, log) = fixture();
        let text = render(&graph, &log);
        let newer = text.find("task_id=1.2").unwrap();
        let older = text.find("task_id=1.1").unwrap();
        assert!(newer < older);
    }

    #[test]
    fn deep_subtasks_render_under_their_parent() {
        let (mut graph, log) = fixture();
        graph
            .add_task(Task::new("1.2.1", TaskKind::Subtask, "Rotate signing keys"))
            .unwrap();

        let text = render(&graph, &log);
        assert!(text.contains("    - [ ] 1.2.1 — Rotate signing keys [pending]"));
    }

    #[test]
    fn empty_log_renders_placeholder() {
        let (graph, _) = fixture();
        let text = render(&graph, &LogStore::new());
        assert!(text.contains("_no entries_"));
    }

    #[test]
    fn future_tasks_section_present_when_nonempty() {
        let (mut graph, log) = fixture();
        graph.future_tasks.push(crate::graph::DeferredItem {
            id: "ft-1".to_string(),
            description: "Harden rate limiting".to_string(),
            origin: "review comment #4".to_string(),
            destination: crate::types::Destination::WaveTask,
            file_context: None,
        });
        let text = render(&graph, &log);
        assert!(text.contains("## Future tasks"));
        assert!(text.contains("ft-1 (wave_task) Harden rate limiting — from review comment #4"));
    }
}
