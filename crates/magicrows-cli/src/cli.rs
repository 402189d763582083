//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// MagicRows: enrich tabular data with AI-generated columns
#[derive(Parser)]
#[command(name = "magicrows")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enrich a data file with an enrichment block
    Enrich {
        /// Path to the data file (CSV/TSV)
        #[arg(value_name = "DATA")]
        data: PathBuf,

        /// Enrichment block preset (.json, .ts or .js)
        #[arg(short, long, value_name = "PRESET")]
        config: PathBuf,

        /// JSON file mapping integration ids to credentials
        #[arg(long, value_name = "FILE")]
        credentials: Option<PathBuf>,

        /// Output path for the enriched table (default: <data>.enriched.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Process every row regardless of the preset's mode
        #[arg(long, conflicts_with = "preview")]
        full: bool,

        /// Preview the first N rows regardless of the preset's mode
        #[arg(long, value_name = "N")]
        preview: Option<usize>,

        /// Answer with synthesized values instead of calling a provider
        #[arg(long)]
        mock: bool,

        /// Maximum number of provider calls in flight
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Timeout for a single provider call, in seconds
        #[arg(long, default_value = "60", value_name = "SECS")]
        timeout: u64,

        /// Write the error list as JSON to this file
        #[arg(long, value_name = "FILE")]
        errors: Option<PathBuf>,
    },

    /// Validate an enrichment block, optionally against a data file
    Validate {
        /// Enrichment block preset (.json, .ts or .js)
        #[arg(short, long, value_name = "PRESET")]
        config: PathBuf,

        /// Data file whose headers the block must match
        #[arg(value_name = "DATA")]
        data: Option<PathBuf>,
    },

    /// Print the JSON Schema requested from the provider
    Contract {
        /// Enrichment block preset (.json, .ts or .js)
        #[arg(short, long, value_name = "PRESET")]
        config: PathBuf,
    },
}
