//! CLI argument definitions using clap
//!
//! Commands:
//! - campusdesk replay --config <path> --fixture <path>
//! - campusdesk watch --config <path> --table <name> [--filter <expr>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// campusdesk - realtime client core of the school dashboard
#[derive(Parser, Debug)]
#[command(name = "campusdesk")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive an unread counter through a fixture against the in-memory backend
    Replay {
        /// Path to configuration file
        #[arg(long, default_value = "./campusdesk.json")]
        config: PathBuf,

        /// Path to the fixture file
        #[arg(long)]
        fixture: PathBuf,
    },

    /// Print change events from the realtime feed until Ctrl-C
    Watch {
        /// Path to configuration file
        #[arg(long, default_value = "./campusdesk.json")]
        config: PathBuf,

        /// Table to listen to
        #[arg(long)]
        table: String,

        /// Schema (defaults to the configured primary schema)
        #[arg(long)]
        schema: Option<String>,

        /// Row filter, e.g. recipient_id=eq.<uuid>
        #[arg(long)]
        filter: Option<String>,

        /// Channel name
        #[arg(long, default_value = "campusdesk-watch")]
        channel: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
