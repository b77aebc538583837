//! fedsync CLI entry point.

use anyhow::Result;
use clap::Parser;

use fedsync::cli::{commands, handle_error, Cli, Commands};
use fedsync::domain::models::Config;
use fedsync::infrastructure::config::ConfigLoader;
use fedsync::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json_mode);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config: Config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    match cli.command {
        Commands::Coordinator(args) => commands::coordinator::execute(args, config).await,
        Commands::Status(args) => commands::status::execute(args, &config, cli.json).await,
        Commands::Pull(args) => commands::pull::execute(args, &config, cli.json).await,
    }
}
