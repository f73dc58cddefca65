//! Core CLI definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::manifest::ManifestCommand;

#[derive(Parser)]
#[command(name = "hgsave")]
#[command(about = "Save file decoder and editor", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a save to JSON (stdout or -o file)
    #[command(visible_alias = "d")]
    Decode {
        /// Path to save file (e.g. save.hg)
        input: PathBuf,

        /// Path to output JSON file (stdout if omitted or -)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },

    /// Encode JSON (positional file or stdin) back into an existing save
    #[command(visible_alias = "e")]
    Encode {
        /// Save file to rewrite; its header and chunk layout are kept
        input: PathBuf,

        /// JSON input file (stdin if omitted or -)
        json: Option<PathBuf>,

        /// Leave the manifest sidecar untouched
        #[arg(long)]
        no_manifest: bool,

        /// Skip the automatic backup
        #[arg(long)]
        no_backup: bool,
    },

    /// Print the value at a path
    #[command(visible_alias = "g")]
    Get {
        /// Path to save file
        input: PathBuf,

        /// JSON path (e.g. "PlayerStateData.Units" or "6f=.wGS")
        path: String,

        /// Key mapping file (uses configured default if not provided)
        #[arg(short, long, env = "HGSAVE_MAPPING")]
        mapping: Option<PathBuf>,
    },

    /// Set the value at a path and write the save back
    Set {
        /// Path to save file
        input: PathBuf,

        /// JSON path to modify
        path: String,

        /// Value to set (auto-detects numbers, bools and null, unless --raw is used)
        value: String,

        /// Treat value as raw JSON (objects, arrays, quoted strings)
        #[arg(short, long)]
        raw: bool,

        /// Key mapping file (uses configured default if not provided)
        #[arg(short, long, env = "HGSAVE_MAPPING")]
        mapping: Option<PathBuf>,

        /// Skip the automatic backup
        #[arg(long)]
        no_backup: bool,
    },

    /// Show container layout and manifest status
    #[command(visible_alias = "i")]
    Info {
        /// Path to save file
        input: PathBuf,
    },

    /// Manifest sidecar operations (show, update, validate)
    #[command(visible_alias = "m")]
    Manifest {
        #[command(subcommand)]
        command: ManifestCommand,
    },

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Set the default key mapping file
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}
