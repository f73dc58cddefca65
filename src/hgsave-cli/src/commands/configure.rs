//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting up hgsave defaults.

use crate::config::Config;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Handle the configure command
pub fn handle(mapping: Option<PathBuf>, show: bool) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    match mapping {
        Some(path) => set_mapping(&mut config, path),
        None => {
            show_usage();
            Ok(())
        }
    }
}

fn show_config(config: &Config) {
    match config.mapping_path() {
        Some(path) => println!("Key mapping: {}", path.display()),
        None => println!("No key mapping configured"),
    }

    if let Ok(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
}

fn set_mapping(config: &mut Config, path: PathBuf) -> Result<()> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Mapping file {} not found", path.display()))?;

    // Fail now rather than on the next get/set
    let count = hgsave::KeyMapper::new()
        .load_mapping_file(&path)
        .with_context(|| format!("Failed to load key mapping {}", path.display()))?;

    config.set_mapping_path(path.clone());
    config.save()?;

    println!("Key mapping configured: {} ({} keys)", path.display(), count);
    if let Ok(config_path) = Config::config_path() {
        println!("Config saved to: {}", config_path.display());
    }

    Ok(())
}

fn show_usage() {
    println!("Usage: hgsave configure --mapping MAPPING_JSON");
    println!("   or: hgsave configure --show");
    println!();
    println!("Note: The mapping translates the short keys saves use (\"6f=\")");
    println!("      into readable names (\"PlayerStateData\") for get and set.");
}
