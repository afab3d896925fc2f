//! Command-line interface for wordwatch.
//!
//! This module provides the CLI structure for the `wordwatch` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CheckCommand, ConfigCommand, LiveCommand, NormalizeCommand, PatternsCommand, ScanCommand,
};

/// wordwatch - Spot forbidden words in on-screen text
///
/// Matches text against a pattern payload, sees through spacing and
/// look-alike characters, and skips words that merely contain a term.
#[derive(Debug, Parser)]
#[command(name = "wordwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decide a single piece of text
    Check(CheckCommand),

    /// Show the normalized form of a piece of text
    Normalize(NormalizeCommand),

    /// Aggregate detections over snapshots read from stdin
    Scan(ScanCommand),

    /// Treat each stdin line as the current content of a text field; a blank
    /// line moves focus away
    Live(LiveCommand),

    /// Inspect pattern payloads
    #[command(subcommand)]
    Patterns(PatternsCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
