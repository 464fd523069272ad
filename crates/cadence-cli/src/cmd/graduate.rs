use crate::output::print_json;
use anyhow::Context;
use cadence_core::{
    graduate::{graduate, FileBacklog, GraduationOptions},
    graph::TaskGraph,
};
use std::path::Path;

pub fn run(root: &Path, spec: &str, force: bool, json: bool) -> anyhow::Result<()> {
    let mut graph = TaskGraph::load(root, spec)?;
    let mut backlog = FileBacklog::at_root(root);

    let result = graduate(&mut graph, &mut backlog, GraduationOptions { force });
    // Items already relocated must leave the deferred list durably even when
    // graduation errored midway, or a retry duplicates backlog lines.
    graph.save(root).context("failed to save task graph")?;
    let report = result?;

    if json {
        print_json(&report)?;
        return Ok(());
    }

    for id in &report.promoted {
        println!("Promoted [{id}] into the live graph");
    }
    for id in &report.graduated {
        println!("Graduated [{id}] to the roadmap");
    }
    for dup in &report.duplicates {
        println!(
            "Skipped [{}]: looks like a duplicate of [{}] (re-run with --force to promote)",
            dup.item_id, dup.matches
        );
    }
    if report.promoted.is_empty() && report.graduated.is_empty() && report.duplicates.is_empty() {
        println!("No deferred items to graduate");
    }
    Ok(())
}
