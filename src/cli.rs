use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelcut")]
#[command(author, version, about = "Lossless MP4 trimming with in-place replacement")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect an MP4 file and list its tracks
    Inspect {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Trim a file in place to the window [start, end)
    Trim {
        /// File to trim; replaced on success
        #[arg(required = true)]
        file: PathBuf,

        /// Window start in seconds
        #[arg(long)]
        start: f64,

        /// Window end in seconds (exclusive)
        #[arg(long)]
        end: f64,

        /// Rebase every track against the window start instead of its own
        /// first sample
        #[arg(long)]
        shared_anchor: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },
}
