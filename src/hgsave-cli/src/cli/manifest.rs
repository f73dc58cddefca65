//! Manifest command CLI definitions

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ManifestCommand {
    /// Decrypt and display the manifest for a save
    Show {
        /// Path to save file (the sidecar is found next to it)
        input: PathBuf,

        /// Slot index (derived from the save file name if not provided)
        #[arg(short, long)]
        slot: Option<u32>,
    },

    /// Recompute the manifest fingerprint from the save as it is on disk
    Update {
        /// Path to save file
        input: PathBuf,

        /// Slot index (derived from the save file name if not provided)
        #[arg(short, long)]
        slot: Option<u32>,
    },

    /// Check whether the manifest fingerprint matches the save
    Validate {
        /// Path to save file
        input: PathBuf,

        /// Slot index (derived from the save file name if not provided)
        #[arg(short, long)]
        slot: Option<u32>,
    },
}
