use crate::output::print_json;
use cadence_core::{config::EngineConfig, session::SessionState};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// Begin a work session
    Start {
        /// Spec the session will focus on
        spec: Option<String>,
    },
    /// End the active session and write a checkpoint
    End {
        /// Version-control revision to record in the checkpoint
        #[arg(long)]
        revision: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: SessionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SessionSubcommand::Start { spec } => start(root, spec.as_deref(), json),
        SessionSubcommand::End { revision } => end(root, revision, json),
    }
}

fn start(root: &Path, spec: Option<&str>, json: bool) -> anyhow::Result<()> {
    let state = SessionState::start(root, spec)?;

    if json {
        print_json(&state)?;
    } else {
        match &state.spec {
            Some(spec) => println!("Session started on '{spec}'"),
            None => println!("Session started"),
        }
    }
    Ok(())
}

fn end(root: &Path, revision: Option<String>, json: bool) -> anyhow::Result<()> {
    let cfg = EngineConfig::load(root)?;
    let state = SessionState::require(root)?;
    let checkpoint = state.end(root, &cfg, revision)?;

    if json {
        print_json(&checkpoint)?;
    } else {
        println!(
            "Session ended: {} minutes, {} tasks completed",
            checkpoint.session_duration_minutes, checkpoint.tasks_completed
        );
    }
    Ok(())
}
