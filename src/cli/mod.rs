//! Command-line interface for proseforge.
//!
//! Provides the entry point with subcommands for running the full
//! generation pipeline, outline-only runs, and preset inspection.

pub mod commands;

pub use commands::Cli;
