mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    checkpoint::CheckpointSubcommand, log::LogSubcommand, session::SessionSubcommand,
    task::TaskSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cadence",
    about = "Crash-safe progress tracking and execution orchestration",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .cadence/ or .git/)
    #[arg(long, global = true, env = "CADENCE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize cadence in the current project
    Init,

    /// Append to and inspect the progress log
    Log {
        #[command(subcommand)]
        subcommand: LogSubcommand,
    },

    /// Change and inspect tasks in a spec's graph
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Regenerate the human-readable view of a spec's graph
    Render { spec: String },

    /// Graduate deferred items into a new wave or the roadmap
    Graduate {
        spec: String,
        /// Process items even when they look like duplicates
        #[arg(long)]
        force: bool,
    },

    /// Manage session checkpoints
    Checkpoint {
        #[command(subcommand)]
        subcommand: CheckpointSubcommand,
    },

    /// Start and end work sessions
    Session {
        #[command(subcommand)]
        subcommand: SessionSubcommand,
    },

    /// Orchestrate task execution via the configured worker
    Run {
        spec: String,
        /// Task ids to execute (default: first unfinished top-level task)
        task_ids: Vec<String>,
        /// Execute every requested task instead of narrowing to the first
        #[arg(long)]
        all: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Log { subcommand } => cmd::log::run(&root, subcommand, cli.json),
        Commands::Task { subcommand } => cmd::task::run(&root, subcommand, cli.json),
        Commands::Render { spec } => cmd::render::run(&root, &spec, cli.json),
        Commands::Graduate { spec, force } => cmd::graduate::run(&root, &spec, force, cli.json),
        Commands::Checkpoint { subcommand } => cmd::checkpoint::run(&root, subcommand, cli.json),
        Commands::Session { subcommand } => cmd::session::run(&root, subcommand, cli.json),
        Commands::Run {
            spec,
            task_ids,
            all,
        } => cmd::run::run(&root, &spec, &task_ids, all, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
