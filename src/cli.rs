use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// eegstream - EEG/MEG recording store and sample-streaming server
#[derive(Parser)]
#[command(name = "eegstream")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (default)
    Serve,

    /// Print metadata for a recording file and exit
    Inspect {
        /// Path to a recording file (EDF, CSV or ASCII)
        path: PathBuf,

        /// Emit machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
}
