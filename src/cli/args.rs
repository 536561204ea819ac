//! CLI argument definitions using clap
//!
//! Commands:
//! - deadswitch init --config <path>
//! - deadswitch serve --config <path>
//! - deadswitch sweep --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dead man's switch service
#[derive(Parser, Debug)]
#[command(name = "deadswitch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "deadswitch=info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration with fresh secrets
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./deadswitch.json")]
        config: PathBuf,

        /// Snapshot file of the record store (default: next to the config)
        #[arg(long)]
        data_path: Option<PathBuf>,
    },

    /// Serve the HTTP API and run the scheduler on its cron cadence
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./deadswitch.json")]
        config: PathBuf,
    },

    /// Run one scheduler cycle and print its report
    Sweep {
        /// Path to configuration file
        #[arg(long, default_value = "./deadswitch.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sweep() {
        let cli = Cli::try_parse_from(["deadswitch", "sweep", "--config", "/etc/ds.json"]).unwrap();
        match cli.command {
            Command::Sweep { config } => assert_eq!(config, PathBuf::from("/etc/ds.json")),
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.log_level, "deadswitch=info");
    }

    #[test]
    fn test_init_defaults() {
        let cli = Cli::try_parse_from(["deadswitch", "init"]).unwrap();
        match cli.command {
            Command::Init { config, data_path } => {
                assert_eq!(config, PathBuf::from("./deadswitch.json"));
                assert!(data_path.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
