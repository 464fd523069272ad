use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use cadence_core::{config::EngineConfig, log::LogStore, types::EntryKind};
use clap::Subcommand;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

#[derive(Subcommand)]
pub enum LogSubcommand {
    /// Append one entry (e.g. `log append task_completed -f task_id=1.2`)
    Append {
        /// Entry kind: session_started, session_ended, task_completed,
        /// task_blocked, debug_resolved, scope_override
        kind: String,
        /// Payload field as KEY=VALUE (repeatable)
        #[arg(short = 'f', long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    /// Show the most recent entries, newest last
    Recent {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Move old entries into monthly archive partitions
    Archive,
}

pub fn run(root: &Path, subcmd: LogSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        LogSubcommand::Append { kind, fields } => append(root, &kind, &fields, json),
        LogSubcommand::Recent { limit } => recent(root, limit, json),
        LogSubcommand::Archive => archive(root, json),
    }
}

fn append(root: &Path, kind: &str, fields: &[String], json: bool) -> anyhow::Result<()> {
    let kind = EntryKind::from_str(kind)?;
    let mut payload = BTreeMap::new();
    for field in fields {
        let Some((key, value)) = field.split_once('=') else {
            bail!("invalid field '{field}': expected KEY=VALUE");
        };
        payload.insert(key.to_string(), value.to_string());
    }

    let entry = LogStore::append(root, kind, payload).context("failed to append entry")?;

    if json {
        print_json(&entry)?;
    } else {
        println!("Appended [{}]: {}", entry.id, entry.kind);
    }
    Ok(())
}

fn recent(root: &Path, limit: usize, json: bool) -> anyhow::Result<()> {
    let store = LogStore::load(root)?;
    let entries = store.recent(limit);

    if json {
        print_json(&entries)?;
        return Ok(());
    }

    let rows = entries
        .iter()
        .map(|e| {
            let payload = e
                .payload
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            vec![
                e.id.clone(),
                e.kind.to_string(),
                e.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                payload,
            ]
        })
        .collect();
    print_table(&["ID", "KIND", "TIMESTAMP", "PAYLOAD"], rows);
    Ok(())
}

fn archive(root: &Path, json: bool) -> anyhow::Result<()> {
    let cfg = EngineConfig::load(root)?;
    let outcome = LogStore::archive(root, &cfg.archive)?;

    if json {
        print_json(&outcome)?;
    } else if outcome.archived == 0 {
        println!("Nothing to archive");
    } else {
        println!(
            "Archived {} entries into: {}",
            outcome.archived,
            outcome.partitions.join(", ")
        );
    }
    Ok(())
}
