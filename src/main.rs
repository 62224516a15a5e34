use anyhow::Result;
use clap::Parser;
use log::info;

use map_engine::cli::Cli;
use map_engine::cli::app::Commands;
use map_engine::cli::commands::{config_command, filter_command, render_command};
use map_engine::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.log_stderr {
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Stderr)
            .init();
    } else {
        // Initialize logger to file (truncate on each run)
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open("map-engine.log")?;
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(log_file)))
            .init();
    }

    info!("Starting map-engine");

    match cli.command {
        Commands::Render(args) => {
            let config = match &cli.config {
                Some(path) => Config::load_from(path)?,
                None => Config::load()?,
            };
            render_command(args, &config).await
        }
        Commands::Filter(args) => filter_command(args).await,
        Commands::Config(args) => config_command(args, cli.config).await,
    }
}
