//! Command handlers for the hgsave CLI
//!
//! Each subcommand has its own module with handler functions.

pub mod configure;
pub mod manifest;
pub mod save;
