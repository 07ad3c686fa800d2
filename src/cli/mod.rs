//! CLI module for campusdesk
//!
//! Provides command-line interface for:
//! - replay: drive an unread counter through a fixture on the in-memory backend
//! - watch: print change events from the realtime feed

mod args;
mod commands;
mod errors;
mod fixture;
mod io;

pub use args::{Cli, Command};
pub use commands::{load_config, replay, replay_to, run, run_command, watch};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use fixture::{Fixture, FixtureStep};
pub use io::{write_error, write_response};
