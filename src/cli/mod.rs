//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// jira2notion - mirror Jira projects into Notion databases
#[derive(Parser, Debug)]
#[command(name = "j2n", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.jira2notion/config.json)
    #[arg(long, global = true, env = "J2N_CONFIG")]
    pub config: Option<PathBuf>,

    /// Checkpoint database path (default: ~/.jira2notion/data/checkpoints.db)
    #[arg(long, global = true, env = "J2N_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync all projects on a fixed interval until interrupted
    Run {
        /// Seconds between cycles (default: check_interval_secs from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run one sync cycle now
    Sync {
        /// Only sync these projects (repeatable; default: all)
        #[arg(short, long = "project")]
        projects: Vec<String>,
    },

    /// Upsert every issue assigned to a user, ignoring checkpoints
    SyncUser {
        /// Only sync these projects (repeatable; default: all)
        #[arg(short, long = "project")]
        projects: Vec<String>,

        /// Account id, email, or `currentUser()` (default: per-project or jira.assignee)
        #[arg(long)]
        assignee: Option<String>,
    },

    /// Check configuration and connectivity
    Status,

    /// Checkpoint management
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand, Debug)]
pub enum CheckpointCommands {
    /// List checkpoints and pending retries
    List,

    /// Forget a project's checkpoint and retry set
    ///
    /// The next cycle falls back to the lookback window.
    Reset {
        /// Project key
        project: String,
    },
}
