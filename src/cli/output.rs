//! Terminal output helpers shared by the commands

use anyhow::{Context, Result};
use colored::*;
use is_terminal::IsTerminal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Read and parse a JSON input file
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file: {}", what, path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} file: {}", what, path.display()))
}

pub fn stdout_is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Heading line, only when a person is reading stdout
pub fn heading(text: &str) {
    if stdout_is_terminal() {
        println!("{}", text.bold().cyan());
    }
}

/// Secondary detail line, only when a person is reading stdout
pub fn note(text: &str) {
    if stdout_is_terminal() {
        println!("{}", text.dimmed());
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}
