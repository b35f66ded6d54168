//! The `treestat` binary.
//!
//! `build` drives the store through ingest and finalize until the tree is
//! ready; `inspect` prints the stored node report for a path as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use treestat_engine::{driver, query, KvOptions, Settings, TreeStore};
use treestat_logging::LogConfig;
use treestat_types::{Result, StatusCode};

#[derive(Parser)]
#[command(name = "treestat", version, about = "Filesystem-inventory ingest and usage rollups")]
struct Cli {
    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory for rolling log files; console-only when unset.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a dump and finalize aggregates until the tree is ready.
    Build(BuildArgs),
    /// Print the stored records for a path as JSON.
    Inspect(InspectArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Read settings from a TOML file; explicit flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path of the gzip dump to ingest.
    #[arg(long)]
    input_path: Option<PathBuf>,

    /// Filesystem path of the store environment.
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Store cache budget in bytes.
    #[arg(long)]
    max_map_size: Option<usize>,

    /// Seconds since epoch used as the cost reference time.
    #[arg(long)]
    cost_reference_time: Option<i64>,

    /// Parser parallelism for the ingest phase.
    #[arg(long)]
    input_workers: Option<usize>,

    /// Worker parallelism for the finalize phase.
    #[arg(long)]
    finalize_workers: Option<usize>,

    /// Dispatch at most this many input lines; -1 for unbounded.
    #[arg(long)]
    stop_input_after_n_lines: Option<i64>,

    /// Cancel finalize after this many nodes; -1 for unbounded.
    #[arg(long)]
    stop_finalize_after_n_nodes: Option<i64>,

    /// Info-log every N created nodes.
    #[arg(long)]
    nodes_created_info_every_n: Option<u64>,

    /// Info-log every N finalized nodes.
    #[arg(long)]
    nodes_finalized_info_every_n: Option<u64>,
}

impl BuildArgs {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text).map_err(|e| {
                    treestat_types::Status::with_message(
                        StatusCode::INVALID_CONFIG,
                        format!("{}: {}", path.display(), e),
                    )
                })?
            }
            None => Settings::default(),
        };

        if let Some(v) = &self.input_path {
            settings.input_path = Some(v.clone());
        }
        if let Some(v) = &self.store_path {
            settings.store_path = v.clone();
        }
        if let Some(v) = self.max_map_size {
            settings.max_map_size = v;
        }
        if let Some(v) = self.cost_reference_time {
            settings.cost_reference_time = v;
        }
        if let Some(v) = self.input_workers {
            settings.input_workers = v;
        }
        if let Some(v) = self.finalize_workers {
            settings.finalize_workers = v;
        }
        if let Some(v) = self.stop_input_after_n_lines {
            settings.stop_input_after_n_lines = v;
        }
        if let Some(v) = self.stop_finalize_after_n_nodes {
            settings.stop_finalize_after_n_nodes = v;
        }
        if let Some(v) = self.nodes_created_info_every_n {
            settings.nodes_created_info_every_n = v;
        }
        if let Some(v) = self.nodes_finalized_info_every_n {
            settings.nodes_finalized_info_every_n = v;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Args)]
struct InspectArgs {
    /// Filesystem path of the store environment.
    #[arg(long)]
    store_path: PathBuf,

    /// Absolute path of the node to report on.
    #[arg(long, default_value = "/")]
    path: String,

    /// How many levels of children to include.
    #[arg(long, default_value_t = 1)]
    depth: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::default();
    if let Some(level) = &cli.log_level {
        log_config.level = level.clone();
    }
    log_config.log_dir = cli.log_dir.clone();
    let _guard = treestat_logging::init_logging(&log_config);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(status) => {
            tracing::error!(error = %status, "treestat failed");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Build(args) => {
            let settings = args.settings()?;
            let store = TreeStore::open(&settings.kv_options())?;
            driver::run(&store, &settings)
        }
        Command::Inspect(args) => {
            let store = TreeStore::open(&KvOptions::new(&args.store_path))?;
            let state = store.state()?;
            if state != treestat_engine::DriverState::TreeReady.as_str() {
                tracing::warn!(state = %state, "store is not treeReady; aggregates may be incomplete");
            }
            let report = query::node_report(&store, &args.path, args.depth)?;
            let rendered = serde_json::to_string_pretty(&report).map_err(|e| {
                treestat_types::Status::with_message(StatusCode::FOUND_BUG, e.to_string())
            })?;
            println!("{rendered}");
            Ok(())
        }
    }
}
