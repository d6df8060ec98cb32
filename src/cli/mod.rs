//! CLI Module
//!
//! Command-line interface for rendering and inspecting projects.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Automix - render automated multi-track projects
#[derive(Parser, Debug)]
#[command(name = "automix")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a project to an audio file
    #[command(name = "render")]
    Render {
        /// Project file (JSON)
        project: PathBuf,

        /// Directory holding the clip WAV files
        #[arg(long)]
        clips: PathBuf,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,

        /// Output format (wav, mp3, flac); guessed from the extension if omitted
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Print each track's effect chain and automation values
    #[command(name = "inspect")]
    Inspect {
        /// Project file (JSON)
        project: PathBuf,

        /// Measure at which to resolve automation
        #[arg(short, long, default_value_t = 1.0)]
        measure: f64,
    },

    /// Print the SHA-256 of the rendered 16-bit PCM
    #[command(name = "checksum")]
    Checksum {
        /// Project file (JSON)
        project: PathBuf,

        /// Directory holding the clip WAV files
        #[arg(long)]
        clips: PathBuf,
    },
}
