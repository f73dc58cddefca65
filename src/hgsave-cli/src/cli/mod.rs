//! CLI argument definitions for hgsave
//!
//! This module contains all clap-derived structs and enums for CLI parsing.

mod core;
mod manifest;

pub use core::{Cli, Commands};
pub use manifest::ManifestCommand;
