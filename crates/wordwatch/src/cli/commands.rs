//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Check command arguments.
#[derive(Debug, Args)]
pub struct CheckCommand {
    /// The text to check
    pub text: String,

    /// Pattern payload to check against (overrides the configured one)
    #[arg(short, long, value_name = "FILE")]
    pub patterns: Option<PathBuf>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Normalize command arguments.
#[derive(Debug, Args)]
pub struct NormalizeCommand {
    /// The text to normalize
    pub text: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Source id for lines without a tag
    #[arg(short, long, default_value = "stdin")]
    pub source: String,

    /// Read `source<TAB>text` lines
    #[arg(short, long)]
    pub tagged: bool,

    /// Pattern payload to scan with (overrides the configured one)
    #[arg(short, long, value_name = "FILE")]
    pub patterns: Option<PathBuf>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Live command arguments.
#[derive(Debug, Args)]
pub struct LiveCommand {
    /// Pattern payload to detect with (overrides the configured one)
    #[arg(short, long, value_name = "FILE")]
    pub patterns: Option<PathBuf>,

    /// Override the debounce interval in milliseconds
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Pattern payload commands.
#[derive(Debug, Subcommand)]
pub enum PatternsCommand {
    /// Validate a pattern payload and print its summary
    Validate {
        /// Path to the JSON payload
        file: PathBuf,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
