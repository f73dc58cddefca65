mod cli;
mod commands;
mod config;
mod file_io;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::*;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hgsave=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            input,
            output,
            pretty,
        } => {
            commands::save::decode(&input, output.as_deref(), pretty)?;
        }

        Commands::Encode {
            input,
            json,
            no_manifest,
            no_backup,
        } => {
            commands::save::encode(&input, json.as_deref(), no_manifest, no_backup)?;
        }

        Commands::Get {
            input,
            path,
            mapping,
        } => {
            commands::save::get(&input, &path, mapping.as_deref())?;
        }

        Commands::Set {
            input,
            path,
            value,
            raw,
            mapping,
            no_backup,
        } => {
            commands::save::set(&input, &path, &value, raw, mapping.as_deref(), no_backup)?;
        }

        Commands::Info { input } => {
            commands::save::info(&input)?;
        }

        Commands::Manifest { command } => match command {
            ManifestCommand::Show { input, slot } => {
                commands::manifest::show(&input, slot)?;
            }

            ManifestCommand::Update { input, slot } => {
                commands::manifest::update(&input, slot)?;
            }

            ManifestCommand::Validate { input, slot } => {
                commands::manifest::validate(&input, slot)?;
            }
        },

        Commands::Configure { mapping, show } => {
            commands::configure::handle(mapping, show)?;
        }
    }

    Ok(())
}
