use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod index;

/// Dataset helpers for chortle
#[derive(Parser, Debug)]
#[command(name = "chortle-tools", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the clip list (and a JSONL manifest) from category folders
    Index {
        #[arg(long)]
        dataset_root: PathBuf,

        /// Clip list to write
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Commands::Index {
            dataset_root,
            output,
            manifest,
        } => {
            index::index(&dataset_root, &output, manifest.as_ref())?;
            Ok(())
        }
    }
}
