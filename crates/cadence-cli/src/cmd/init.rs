use anyhow::Context;
use cadence_core::{config::EngineConfig, io, log::LogStore, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing cadence in: {}", root.display());

    // 1. Create .cadence directory structure
    let dirs = [
        paths::CADENCE_DIR,
        paths::SPECS_DIR,
        paths::ARCHIVE_DIR,
        paths::CHECKPOINTS_DIR,
    ];
    for dir in dirs {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    // 2. Write config.yaml if missing
    let config_path = paths::config_path(root);
    if !config_path.exists() {
        let cfg = EngineConfig::new(&project_name);
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: .cadence/config.yaml");
    } else {
        println!("  exists:  .cadence/config.yaml");
    }

    // 3. Write an empty progress log if missing
    let progress_path = paths::progress_path(root);
    if !progress_path.exists() {
        LogStore::new()
            .save(root)
            .context("failed to write progress.yaml")?;
        println!("  created: .cadence/progress.yaml");
    } else {
        println!("  exists:  .cadence/progress.yaml");
    }

    // 4. Seed the roadmap backlog if missing
    if io::write_if_missing(&paths::roadmap_path(root), b"# Roadmap\n\n")? {
        println!("  created: .cadence/roadmap.md");
    } else {
        println!("  exists:  .cadence/roadmap.md");
    }

    Ok(())
}
