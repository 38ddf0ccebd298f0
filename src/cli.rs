//! Command line options.

use clap::{ArgGroup, Parser, Subcommand};

/// Paced bulk generator for masked email aliases.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Opts {
    /// Runs the interactive menu when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate and reserve new aliases.
    Generate {
        /// Number of aliases to reserve.
        #[arg(long, default_value_t = 5)]
        total: usize,

        /// Aliases per batch (defaults to `max_concurrent_tasks`).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Hours to wait between batches (defaults to `delay_hours`).
        #[arg(long)]
        delay: Option<f64>,

        /// Retries per alias on transient failures (defaults to `max_retries`).
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Show existing aliases.
    #[command(group(ArgGroup::new("activity").args(["active", "inactive", "all"])))]
    List {
        /// Only active aliases (the default).
        #[arg(long)]
        active: bool,

        /// Only inactive aliases.
        #[arg(long)]
        inactive: bool,

        /// Both active and inactive aliases.
        #[arg(long)]
        all: bool,

        /// Case-insensitive regular expression matched against labels.
        #[arg(long)]
        search: Option<String>,

        /// Export the listing as CSV.
        #[arg(long)]
        save: bool,
    },

    /// Interactive menu.
    Menu,
}
