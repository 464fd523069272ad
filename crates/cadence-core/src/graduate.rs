//! Graduation: moving deferred items out of a task graph, either into the
//! live graph as a fresh wave of parent tasks or into the external long-term
//! backlog. Runs to completion without creating duplicates or orphans; an
//! ambiguous near-duplicate is surfaced to the caller instead of being
//! silently skipped or auto-merged.

use crate::error::{CadenceError, Result};
use crate::graph::{DeferredItem, TaskGraph};
use crate::task::{Task, TaskId};
use crate::types::{Destination, TaskKind};
use serde::Serialize;
use std::io::Write as _;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Backlog collaborator
// ---------------------------------------------------------------------------

/// Narrow interface to the external long-term backlog. The engine never
/// inspects the backlog's internals; it only appends.
pub trait Backlog {
    fn append_item(&mut self, item: &DeferredItem) -> Result<()>;
}

/// Default backlog: bullet lines appended to a markdown file
/// (`.cadence/roadmap.md` unless configured otherwise).
pub struct FileBacklog {
    path: PathBuf,
}

impl FileBacklog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_root(root: &Path) -> Self {
        Self::new(crate::paths::roadmap_path(root))
    }
}

impl Backlog for FileBacklog {
    fn append_item(&mut self, item: &DeferredItem) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // Origin is preserved verbatim: the item relocates, it does not mutate.
        writeln!(f, "- {} (from {})", item.description, item.origin)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// An item whose description closely matches existing work. Left in
/// `future_tasks`; the caller decides whether to merge or re-run with
/// `force`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCandidate {
    pub item_id: String,
    /// Id of the live task (or deferred item processed earlier in this run)
    /// it resembles.
    pub matches: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraduationReport {
    /// Task ids synthesized into the live graph (wave tasks).
    pub promoted: Vec<TaskId>,
    /// Deferred-item ids relocated to the external backlog.
    pub graduated: Vec<String>,
    pub duplicates: Vec<DuplicateCandidate>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GraduationOptions {
    /// Process items even when they look like duplicates.
    pub force: bool,
}

// ---------------------------------------------------------------------------
// graduate
// ---------------------------------------------------------------------------

pub fn graduate(
    graph: &mut TaskGraph,
    backlog: &mut dyn Backlog,
    opts: GraduationOptions,
) -> Result<GraduationReport> {
    if !graph.supports_graduation() {
        return Err(CadenceError::UnsupportedVersion {
            version: graph.version.clone(),
            operation: "graduate".to_string(),
        });
    }

    let mut report = GraduationReport::default();
    // One wave per run: every promoted item lands in the same execution round.
    let mut wave: Option<u32> = None;

    // Each item leaves `future_tasks` the moment its side effect lands; an
    // error partway through must not re-process earlier items on retry.
    let mut i = 0;
    while i < graph.future_tasks.len() {
        let item = graph.future_tasks[i].clone();
        if !opts.force {
            if let Some(matches) = duplicate_of(graph, &item) {
                report.duplicates.push(DuplicateCandidate {
                    item_id: item.id.clone(),
                    matches,
                });
                i += 1;
                continue;
            }
        }

        match item.destination {
            Destination::RoadmapItem => {
                backlog.append_item(&item)?;
                report.graduated.push(item.id.clone());
            }
            Destination::WaveTask => {
                let wave = *wave.get_or_insert_with(|| graph.next_wave());
                let id = allocate_id(graph);
                let mut task = Task::new(id.clone(), TaskKind::Parent, item.description.clone());
                task.needs_expansion = true;
                task.promoted_from = Some(item.id.clone());
                task.wave = Some(wave);
                if let Some(ctx) = &item.file_context {
                    task.file_scope.push(ctx.clone());
                }
                graph.add_task(task)?;
                report.promoted.push(id);
            }
        }
        graph.future_tasks.remove(i);
    }

    tracing::info!(
        promoted = report.promoted.len(),
        graduated = report.graduated.len(),
        duplicates = report.duplicates.len(),
        "graduation complete"
    );
    Ok(report)
}

/// Fresh top-level id, with a `.2`/`.3`… suffix when the base id is already
/// taken (possible when existing ids are non-numeric).
fn allocate_id(graph: &TaskGraph) -> TaskId {
    let base = graph.next_top_level_id();
    if !graph.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = TaskId::new(format!("{base}.{n}"));
        if !graph.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Id of a live task whose description closely matches `item`, if any.
fn duplicate_of(graph: &TaskGraph, item: &DeferredItem) -> Option<String> {
    let needle = normalize(&item.description);
    graph
        .tasks
        .iter()
        .find(|t| normalize(&t.description) == needle)
        .map(|t| t.id.to_string())
}

/// Case/whitespace/punctuation-insensitive comparison key.
fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;
    use tempfile::TempDir;

    struct MemBacklog(Vec<String>);

    impl Backlog for MemBacklog {
        fn append_item(&mut self, item: &DeferredItem) -> Result<()> {
            self.0.push(format!("{} (from {})", item.description, item.origin));
            Ok(())
        }
    }

    struct FailOn {
        fail_id: String,
        lines: Vec<String>,
    }

    impl Backlog for FailOn {
        fn append_item(&mut self, item: &DeferredItem) -> Result<()> {
            if item.id == self.fail_id {
                return Err(CadenceError::Validation("backlog unavailable".to_string()));
            }
            self.lines.push(item.description.clone());
            Ok(())
        }
    }

    fn deferred(id: &str, desc: &str, destination: Destination) -> DeferredItem {
        DeferredItem {
            id: id.to_string(),
            description: desc.to_string(),
            origin: format!("review of {id}"),
            destination,
            file_context: Some("src/net/".to_string()),
        }
    }

    fn seeded_graph() -> TaskGraph {
        let mut g = TaskGraph::new("demo");
        let mut t = Task::new("1", TaskKind::Parent, "Ship the codec");
        t.wave = Some(1);
        g.add_task(t).unwrap();
        g
    }

    #[test]
    fn wave_items_become_expansion_parents() {
        let mut g = seeded_graph();
        g.future_tasks
            .push(deferred("ft-1", "Tighten backpressure", Destination::WaveTask));

        let mut backlog = MemBacklog(Vec::new());
        let report = graduate(&mut g, &mut backlog, GraduationOptions::default()).unwrap();

        assert_eq!(report.promoted, vec![TaskId::new("2")]);
        assert!(g.future_tasks.is_empty());

        let task = g.task(&TaskId::new("2")).unwrap();
        assert!(task.needs_expansion);
        assert_eq!(task.promoted_from.as_deref(), Some("ft-1"));
        assert_eq!(task.wave, Some(2));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.file_scope, vec!["src/net/".to_string()]);
    }

    #[test]
    fn roadmap_items_relocate_verbatim() {
        let mut g = seeded_graph();
        g.future_tasks
            .push(deferred("ft-2", "Evaluate io_uring", Destination::RoadmapItem));

        let mut backlog = MemBacklog(Vec::new());
        let report = graduate(&mut g, &mut backlog, GraduationOptions::default()).unwrap();

        assert_eq!(report.graduated, vec!["ft-2".to_string()]);
        assert!(report.promoted.is_empty());
        assert!(g.future_tasks.is_empty());
        assert_eq!(backlog.0, vec!["Evaluate io_uring (from review of ft-2)"]);
    }

    #[test]
    fn all_wave_items_share_one_wave_and_get_unique_ids() {
        let mut g = seeded_graph();
        for (id, desc) in [("a", "First follow-up"), ("b", "Second follow-up")] {
            g.future_tasks.push(deferred(id, desc, Destination::WaveTask));
        }

        let mut backlog = MemBacklog(Vec::new());
        let report = graduate(&mut g, &mut backlog, GraduationOptions::default()).unwrap();

        assert_eq!(report.promoted.len(), 2);
        let waves: Vec<_> = report
            .promoted
            .iter()
            .map(|id| g.task(id).unwrap().wave.unwrap())
            .collect();
        assert_eq!(waves, vec![2, 2]);
        assert_ne!(report.promoted[0], report.promoted[1]);
    }

    #[test]
    fn id_collision_gets_disambiguating_suffix() {
        let mut g = seeded_graph();
        // Occupy the numeric successor with a non-numeric-friendly layout.
        g.add_task(Task::new("2", TaskKind::Parent, "Existing two")).unwrap();
        g.add_task(Task::new("3", TaskKind::Parent, "Existing three")).unwrap();
        // Force the allocator into the taken range.
        g.future_tasks
            .push(deferred("ft-3", "Needs a fresh id", Destination::WaveTask));

        let mut backlog = MemBacklog(Vec::new());
        let report = graduate(&mut g, &mut backlog, GraduationOptions::default()).unwrap();
        // "4" is free, so no suffix needed here; uniqueness is what matters.
        assert_eq!(report.promoted, vec![TaskId::new("4")]);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn duplicates_surface_and_stay_deferred() {
        let mut g = seeded_graph();
        g.future_tasks.push(deferred(
            "ft-4",
            "Ship the codec!",
            Destination::WaveTask,
        ));

        let mut backlog = MemBacklog(Vec::new());
        let report = graduate(&mut g, &mut backlog, GraduationOptions::default()).unwrap();

        assert!(report.promoted.is_empty());
        assert_eq!(
            report.duplicates,
            vec![DuplicateCandidate {
                item_id: "ft-4".to_string(),
                matches: "1".to_string(),
            }]
        );
        // Not silently skipped: still present for the caller to resolve.
        assert_eq!(g.future_tasks.len(), 1);
    }

    #[test]
    fn force_processes_duplicates() {
        let mut g = seeded_graph();
        g.future_tasks.push(deferred(
            "ft-4",
            "Ship the codec!",
            Destination::WaveTask,
        ));

        let mut backlog = MemBacklog(Vec::new());
        let report =
            graduate(&mut g, &mut backlog, GraduationOptions { force: true }).unwrap();
        assert_eq!(report.promoted.len(), 1);
        assert!(g.future_tasks.is_empty());
    }

    #[test]
    fn backlog_failure_does_not_reprocess_earlier_items() {
        let mut g = seeded_graph();
        g.future_tasks
            .push(deferred("ft-5", "Document the codec", Destination::RoadmapItem));
        g.future_tasks
            .push(deferred("ft-6", "Publish the codec", Destination::RoadmapItem));

        let mut backlog = FailOn {
            fail_id: "ft-6".to_string(),
            lines: Vec::new(),
        };
        let err = graduate(&mut g, &mut backlog, GraduationOptions::default()).unwrap_err();
        assert!(matches!(err, CadenceError::Validation(_)));

        // ft-5 landed in the backlog and left the deferred list; ft-6 stays.
        assert_eq!(backlog.lines, vec!["Document the codec"]);
        assert_eq!(g.future_tasks.len(), 1);
        assert_eq!(g.future_tasks[0].id, "ft-6");

        // The retry only processes what is still deferred.
        let mut retry = MemBacklog(Vec::new());
        let report = graduate(&mut g, &mut retry, GraduationOptions::default()).unwrap();
        assert_eq!(report.graduated, vec!["ft-6".to_string()]);
        assert_eq!(retry.0.len(), 1);
        assert!(g.future_tasks.is_empty());
    }

    #[test]
    fn old_schema_versions_refuse_graduation() {
        let mut g = seeded_graph();
        g.version = "2.0".to_string();
        let mut backlog = MemBacklog(Vec::new());
        assert!(matches!(
            graduate(&mut g, &mut backlog, GraduationOptions::default()),
            Err(CadenceError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn file_backlog_appends_lines() {
        let dir = TempDir::new().unwrap();
        let mut backlog = FileBacklog::at_root(dir.path());
        backlog
            .append_item(&deferred("ft-9", "Document the wire format", Destination::RoadmapItem))
            .unwrap();
        backlog
            .append_item(&deferred("ft-10", "Profile the hot path", Destination::RoadmapItem))
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join(".cadence/roadmap.md")).unwrap();
        assert_eq!(
            text,
            "- Document the wire format (from review of ft-9)\n- Profile the hot path (from review of ft-10)\n"
        );
    }
}
