//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - generate: run the full outline-then-prose pipeline on a source file
//! - outline: run only the outline stage
//! - volumes: list the target volume presets

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Proseforge - a rate-limited AI prose generation queue
#[derive(Parser, Debug)]
#[command(name = "proseforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate prose from a source text file
    Generate {
        /// Path to the source text file
        source: PathBuf,

        /// Target volume preset (15k, 30k, 40k, 60k)
        #[arg(short = 'V', long, default_value = "15k")]
        volume: String,

        /// Instructions for the outline stage
        #[arg(long, default_value = "")]
        outline_instructions: String,

        /// Instructions for the prose stage
        #[arg(long, default_value = "")]
        prose_instructions: String,

        /// Path to a sample outline used as a formatting reference
        #[arg(long)]
        sample: Option<PathBuf>,

        /// Write the final prose here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate only the outline for a source text file
    Outline {
        /// Path to the source text file
        source: PathBuf,

        /// Instructions for the outline stage
        #[arg(long, default_value = "")]
        instructions: String,

        /// Path to a sample outline used as a formatting reference
        #[arg(long)]
        sample: Option<PathBuf>,
    },

    /// List the target volume presets
    Volumes,
}
