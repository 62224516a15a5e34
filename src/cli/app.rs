use super::commands::{ConfigCommands, FilterCommands, RenderCommands};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "map-engine")]
#[command(about = "Build categorized marker maps headlessly and inspect the resulting state")]
pub struct Cli {
    /// Write logs to stderr instead of map-engine.log
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a map from a dataset and print its state as JSON
    Render(RenderCommands),
    /// Apply a filter event to a dataset and print what survives
    Filter(FilterCommands),
    /// Inspect configuration
    Config(ConfigCommands),
}
