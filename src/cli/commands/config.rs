use crate::cli::output;
use crate::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use log::info;
use std::path::PathBuf;

#[derive(Args)]
pub struct ConfigCommands {
    #[command(subcommand)]
    pub command: ConfigSubcommands,
}

#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print where the configuration file is read from
    Path,
}

pub async fn config_command(args: ConfigCommands, config_path: Option<PathBuf>) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => Config::get_config_path()?,
    };

    match args.command {
        ConfigSubcommands::Show => {
            info!("Showing config from {:?}", path);
            let config = Config::load_from(&path)?;
            output::heading(&format!("Configuration ({})", path.display()));
            let text = toml::to_string_pretty(&config)
                .context("Failed to serialize config to TOML")?;
            println!("{}", text);
        }
        ConfigSubcommands::Path => {
            println!("{}", path.display());
            if !path.exists() {
                output::note("(file does not exist; defaults are in effect)");
            }
        }
    }

    Ok(())
}
