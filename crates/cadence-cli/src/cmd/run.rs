use crate::output::print_json;
use anyhow::bail;
use cadence_core::{
    config::EngineConfig,
    orchestrate::{
        NoopVcs, NoopVerifier, Orchestrator, ProcessWorker, RunOutcome, ShellVerifier, Verifier,
    },
    task::TaskId,
};
use std::path::Path;
use std::time::Duration;

pub fn run(root: &Path, spec: &str, task_ids: &[String], all: bool, json: bool) -> anyhow::Result<()> {
    let cfg = EngineConfig::load(root)?;

    let Some(command) = &cfg.orchestrator.worker_command else {
        bail!("no worker_command configured in .cadence/config.yaml");
    };
    let worker = ProcessWorker::new(
        command,
        Duration::from_secs(u64::from(cfg.orchestrator.worker_timeout_minutes) * 60),
    );
    let verifier: Box<dyn Verifier> = match &cfg.orchestrator.verify_command {
        Some(cmd) => Box::new(ShellVerifier::new(cmd)),
        None => Box::new(NoopVerifier),
    };

    let requested: Vec<TaskId> = task_ids.iter().map(TaskId::new).collect();
    let outcome = Orchestrator::new(root, &cfg, &worker, verifier.as_ref(), &NoopVcs)
        .run(spec, &requested, all)?;

    if json {
        print_json(&outcome)?;
        return Ok(());
    }

    match &outcome {
        RunOutcome::Success { completed } => {
            println!("Run succeeded: {} task(s) completed", completed.len());
        }
        RunOutcome::PartialWithBlockers {
            completed,
            blocked,
            reopened,
        } => {
            println!(
                "Run finished with blockers: {} completed, {} blocked",
                completed.len(),
                blocked.len()
            );
            for id in blocked {
                println!("  blocked: [{id}]");
            }
            if let Some(id) = reopened {
                println!("  reopened after failed verification: [{id}]");
            }
        }
        RunOutcome::Aborted { reason } => {
            println!("Run aborted: {reason}");
        }
    }
    Ok(())
}
