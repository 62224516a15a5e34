pub mod config;
pub mod filter;
pub mod render;

pub use config::{ConfigCommands, ConfigSubcommands, config_command};
pub use filter::{FilterCommands, filter_command};
pub use render::{RenderCommands, render_command};
