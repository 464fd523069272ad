use crate::output::print_json;
use anyhow::Context;
use cadence_core::{graph::TaskGraph, io, log::LogStore, paths, render};
use std::path::Path;

pub fn run(root: &Path, spec: &str, json: bool) -> anyhow::Result<()> {
    let graph = TaskGraph::load(root, spec)?;
    let log = LogStore::load(root)?;
    let rendered = render::render(&graph, &log);

    let path = paths::rendered_path(root, spec);
    io::atomic_write(&path, rendered.as_bytes()).context("failed to write rendered view")?;

    if json {
        print_json(&serde_json::json!({
            "spec": spec,
            "path": path.display().to_string(),
            "bytes": rendered.len(),
        }))?;
    } else {
        println!("Rendered {} → {}", spec, path.display());
    }
    Ok(())
}
