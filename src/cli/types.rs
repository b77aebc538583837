//! CLI type definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::{coordinator::CoordinatorArgs, pull::PullArgs, status::StatusArgs};

#[derive(Parser)]
#[command(name = "fedsync")]
#[command(about = "fedsync - federated tactic statistics", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Load configuration from this file instead of .fedsync/
    #[arg(short, long, global = true, env = "FEDSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the round coordinator over HTTP
    Coordinator(CoordinatorArgs),

    /// Show a coordinator's public counters
    Status(StatusArgs),

    /// Download the latest global snapshot through the configured transport
    Pull(PullArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["fedsync", "status", "--json", "--config", "custom.yaml"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_parse_coordinator_overrides() {
        let cli = Cli::try_parse_from(["fedsync", "coordinator", "--port", "9400", "--threshold", "3"])
            .unwrap();
        match cli.command {
            Commands::Coordinator(args) => {
                assert_eq!(args.port, Some(9400));
                assert_eq!(args.threshold, Some(3));
                assert!(args.host.is_none());
            }
            _ => panic!("expected coordinator command"),
        }
    }
}
