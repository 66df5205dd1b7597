//! # cpqindex
//!
//! Builds CPQ-native indexes over edge-labeled graphs.
//!
//! ## Usage
//!
//! ```bash
//! # Index a graph up to path length 3 and print the blocks side by side
//! cpqindex build -d graph.txt -k 3 --format table
//!
//! # With canonical cores on all CPUs, writing JSON and a canonical export
//! cpqindex build -d graph.txt -k 2 --cores -t 0 -f json -o index.json --export index.cpqx
//!
//! # Check an export, then look at one query
//! cpqindex verify -d graph.txt -k 2 --cores -i index.cpqx
//! cpqindex canon "(0◦1⁻) ∩ id"
//! ```
//!
//! Logging goes to stderr. `CPQINDEX_LOG_FORMAT=json` switches to JSON
//! lines and `RUST_LOG` overrides the filter.

use clap::Parser;
use cpqindex::cli;
use cpqindex::config::{AppConfig, LogFormat, LoggingSection};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging, cli.verbose);

    if let Err(e) = cli::execute(cli, &config) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. `RUST_LOG` beats the config filter.
fn init_tracing(logging: &LoggingSection, verbose: bool) {
    let default_filter = match (&logging.filter, verbose) {
        (_, true) => "cpqindex=debug".to_string(),
        (Some(filter), false) => filter.clone(),
        (None, false) => "cpqindex=info".to_string(),
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
