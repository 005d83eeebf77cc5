use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Ingest and query agent session telemetry", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Directory holding the conductor SQLite database and default lock file.
    #[arg(long, default_value = "~/.conductor", global = true)]
    pub data_dir: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch `root` for new/changed session files and ingest them until interrupted.
    Run {
        /// Directory tree to watch for session JSONL files.
        root: String,
        /// Filename glob matched against each candidate file.
        #[arg(long, default_value = "*.jsonl")]
        pattern: String,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        batch_timeout_ms: Option<u64>,
    },
    /// Print aggregate behavioral metrics for one project.
    Project {
        name: String,
        /// Directory tree to discover session files under.
        root: String,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        errors_only: bool,
        #[arg(long)]
        json: bool,
    },
    /// Write a default engine configuration file.
    Init {
        /// Directory the generated config will watch.
        root: String,
        #[arg(long)]
        force: bool,
    },
}
