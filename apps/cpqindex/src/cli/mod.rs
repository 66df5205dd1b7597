//! # cpqindex CLI Module
//!
//! This module implements the CLI interface for cpqindex.
//!
//! ## Available Commands
//!
//! - `build` - Build an index and print or write it
//! - `stats` - Build an index and report counts only
//! - `verify` - Check a canonical export against a fresh build
//! - `canon` - Canonical form of one CPQ

mod commands;

use crate::config::{AppConfig, OutputFormat};
use clap::{Args, Parser, Subcommand};
use cpqindex_core::IndexError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// cpqindex - CPQ-native graph index
///
/// Partitions the vertex pairs of an edge-labeled graph by
/// k-path-bisimulation and describes each block by canonical CPQ cores.
#[derive(Parser, Debug)]
#[command(name = "cpqindex")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Graph input and construction flags shared by several commands.
///
/// Unset flags fall back to the configuration.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct IndexArgs {
    /// Path to the graph file
    #[arg(short, long)]
    pub data: PathBuf,

    /// Longest indexed path length
    #[arg(short)]
    pub k: Option<usize>,

    /// Compute canonical cores for every block
    #[arg(long)]
    pub cores: bool,

    /// Labeling threads (0 = all CPUs)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Largest number of cores intersected at once
    #[arg(long)]
    pub intersections: Option<usize>,

    /// Only keep these label ids (comma-separated)
    #[arg(long)]
    pub labels: Option<String>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an index and print it
    Build {
        #[command(flatten)]
        index: IndexArgs,

        /// Write the rendered index here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Sort pairs and blocks before printing
        #[arg(long)]
        sort: bool,

        /// Also write the canonical binary export to this file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Build an index and report counts
    Stats {
        #[command(flatten)]
        index: IndexArgs,
    },

    /// Check a canonical export against a fresh build
    Verify {
        #[command(flatten)]
        index: IndexArgs,

        /// Canonical export to check
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the canonical form of a CPQ, e.g. "(0◦1⁻) ∩ id"
    Canon {
        /// Query text
        query: String,

        /// Treat the query graph as already being a core
        #[arg(long)]
        core: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments and loaded configuration.
pub fn execute(cli: Cli, config: &AppConfig) -> Result<(), IndexError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Build {
            index,
            output,
            format,
            sort,
            export,
        } => {
            let format = if json_mode {
                Some(OutputFormat::Json)
            } else {
                format
            };
            cmd_build(
                config,
                &index,
                &BuildOutput {
                    output,
                    format,
                    sort,
                    export,
                },
            )
        }
        Commands::Stats { index } => cmd_stats(config, &index, json_mode),
        Commands::Verify { index, input } => cmd_verify(config, &index, &input, json_mode),
        Commands::Canon { query, core } => cmd_canon(config, &query, core, json_mode),
    }
}
