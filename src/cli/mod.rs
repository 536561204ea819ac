//! CLI module
//!
//! - init: write a configuration with fresh secrets
//! - serve: HTTP API plus the cron-driven scheduler
//! - sweep: one scheduler cycle, report on stdout

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, run, run_command, serve, sweep};
pub use errors::{CliError, CliResult};
