//! deadswitch CLI entry point
//!
//! Parses arguments, installs the log subscriber, dispatches to the CLI
//! module, and exits non-zero on failure.

use deadswitch::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse_args();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("deadswitch=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run(cli) {
        eprintln!("{}: {}", e.code_str(), e);
        std::process::exit(1);
    }
}
