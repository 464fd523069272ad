use crate::output::print_json;
use anyhow::{bail, Context};
use cadence_core::{
    graph::TaskGraph,
    log::LogStore,
    task::TaskId,
    types::{EntryKind, TaskStatus},
};
use clap::Subcommand;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Change a task's status (pending, in_progress, pass, blocked)
    Status {
        spec: String,
        task_id: String,
        status: String,
        /// Required when blocking: what is in the way
        #[arg(long)]
        reason: Option<String>,
    },
    /// Reopen a passed task for rework
    Reopen { spec: String, task_id: String },
    /// Show full details for a single task
    Show { spec: String, task_id: String },
}

pub fn run(root: &Path, subcmd: TaskSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TaskSubcommand::Status {
            spec,
            task_id,
            status,
            reason,
        } => status_cmd(root, &spec, &task_id, &status, reason.as_deref(), json),
        TaskSubcommand::Reopen { spec, task_id } => reopen(root, &spec, &task_id, json),
        TaskSubcommand::Show { spec, task_id } => show(root, &spec, &task_id, json),
    }
}

fn status_cmd(
    root: &Path,
    spec: &str,
    task_id: &str,
    status: &str,
    reason: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let status = TaskStatus::from_str(status)?;
    let id = TaskId::new(task_id);
    let mut graph = TaskGraph::load(root, spec)?;

    if status == TaskStatus::Blocked {
        let Some(reason) = reason else {
            bail!("blocking a task requires --reason");
        };
        graph.set_notes(&id, reason)?;
    }
    graph.set_status(&id, status)?;
    graph.save(root).context("failed to save task graph")?;

    // Status changes that end an attempt are progress-log events too.
    match status {
        TaskStatus::Pass => {
            let mut payload = BTreeMap::new();
            payload.insert("task_id".to_string(), id.to_string());
            payload.insert("spec".to_string(), spec.to_string());
            LogStore::append(root, EntryKind::TaskCompleted, payload)?;
        }
        TaskStatus::Blocked => {
            let mut payload = BTreeMap::new();
            payload.insert("task_id".to_string(), id.to_string());
            payload.insert("reason".to_string(), reason.unwrap_or_default().to_string());
            LogStore::append(root, EntryKind::TaskBlocked, payload)?;
        }
        _ => {}
    }

    if json {
        print_json(&serde_json::json!({
            "spec": spec,
            "task_id": task_id,
            "status": status.as_str(),
        }))?;
    } else {
        println!("Task [{task_id}] → {status}");
    }
    Ok(())
}

fn reopen(root: &Path, spec: &str, task_id: &str, json: bool) -> anyhow::Result<()> {
    let id = TaskId::new(task_id);
    let mut graph = TaskGraph::load(root, spec)?;
    graph.reopen(&id)?;
    graph.save(root).context("failed to save task graph")?;

    if json {
        print_json(&serde_json::json!({
            "spec": spec,
            "task_id": task_id,
            "status": "in_progress",
        }))?;
    } else {
        println!("Reopened task [{task_id}]");
    }
    Ok(())
}

fn show(root: &Path, spec: &str, task_id: &str, json: bool) -> anyhow::Result<()> {
    let id = TaskId::new(task_id);
    let graph = TaskGraph::load(root, spec)?;
    let task = graph
        .task(&id)
        .with_context(|| format!("task '{task_id}' not found in '{spec}'"))?;

    if json {
        print_json(task)?;
    } else {
        print!("{}", serde_yaml::to_string(task)?);
    }
    Ok(())
}
