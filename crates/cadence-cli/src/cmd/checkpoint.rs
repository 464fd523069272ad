use crate::output::{print_json, print_table};
use anyhow::Context;
use cadence_core::{checkpoint::Checkpoint, config::EngineConfig, session::SessionState};
use chrono::Utc;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum CheckpointSubcommand {
    /// Snapshot the current session state
    Create {
        /// Version-control revision to record (e.g. a commit hash)
        #[arg(long)]
        revision: Option<String>,
    },
    /// List checkpoints, oldest first
    List,
}

pub fn run(root: &Path, subcmd: CheckpointSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CheckpointSubcommand::Create { revision } => create(root, revision, json),
        CheckpointSubcommand::List => list(root, json),
    }
}

fn create(root: &Path, revision: Option<String>, json: bool) -> anyhow::Result<()> {
    let cfg = EngineConfig::load(root)?;

    // Outside a session there is no duration to record.
    let duration = match SessionState::current(root)? {
        Some(session) => (Utc::now() - session.started_at).num_minutes(),
        None => 0,
    };

    let checkpoint = Checkpoint::new(revision, duration, 0);
    let path = checkpoint
        .write(root, &cfg.checkpoints)
        .context("failed to write checkpoint")?;

    if json {
        print_json(&checkpoint)?;
    } else {
        println!("Checkpoint written: {}", path.display());
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let all = Checkpoint::list(root)?;

    if json {
        let checkpoints: Vec<_> = all.iter().map(|(_, cp)| cp).collect();
        print_json(&checkpoints)?;
        return Ok(());
    }

    let rows = all
        .iter()
        .map(|(_, cp)| {
            vec![
                cp.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                cp.external_revision.clone().unwrap_or_else(|| "-".into()),
                cp.session_duration_minutes.to_string(),
                cp.tasks_completed.to_string(),
            ]
        })
        .collect();
    print_table(&["CREATED", "REVISION", "MINUTES", "TASKS"], rows);
    Ok(())
}
