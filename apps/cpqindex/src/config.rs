//! # Configuration
//!
//! Settings come from four places, highest precedence first:
//!
//! 1. command-line flags (applied by the commands)
//! 2. environment variables (`CPQINDEX_THREADS`, `CPQINDEX_LOG_FORMAT`)
//! 3. the TOML file given with `--config`
//! 4. built-in defaults
//!
//! ```toml
//! [index]
//! k = 3
//! cores = true
//! threads = 0          # 0 = all logical CPUs
//! intersections = 2
//! oracle_timeout_ms = 5000
//!
//! [logging]
//! format = "json"
//! filter = "cpqindex=debug"
//!
//! [output]
//! format = "table"
//! sort = true
//! ```

use cpqindex_core::IndexError;
use cpqindex_core::primitives::{DEFAULT_K, DEFAULT_LABELING_THREADS};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Environment variable overriding `index.threads`.
pub const ENV_THREADS: &str = "CPQINDEX_THREADS";

/// Environment variable overriding `logging.format`.
pub const ENV_LOG_FORMAT: &str = "CPQINDEX_LOG_FORMAT";

/// Largest accepted config file (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub index: IndexSection,
    pub logging: LoggingSection,
    pub output: OutputSection,
}

/// `[index]`: construction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSection {
    pub k: usize,
    pub cores: bool,
    /// Labeling threads; `0` means all logical CPUs.
    pub threads: usize,
    pub intersections: Option<usize>,
    pub oracle_timeout_ms: Option<u64>,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            cores: false,
            threads: DEFAULT_LABELING_THREADS,
            intersections: None,
            oracle_timeout_ms: None,
        }
    }
}

impl IndexSection {
    /// Thread count with `0` resolved to the number of logical CPUs.
    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

/// `[logging]`: subscriber setup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub format: LogFormat,
    /// An `EnvFilter` directive; `RUST_LOG` still wins when set.
    pub filter: Option<String>,
}

/// `[output]`: how `build` prints the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    pub format: OutputFormat,
    pub sort: bool,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(IndexError::InvalidArgument(format!(
                "unknown log format '{}'. Use: text, json",
                other
            ))),
        }
    }
}

/// Index output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One block after another.
    #[default]
    Listing,
    /// Blocks side by side.
    Table,
    /// Machine-readable block list.
    Json,
}

// =============================================================================
// LOADING
// =============================================================================

impl AppConfig {
    /// Defaults, then the file (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, IndexError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, IndexError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            IndexError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(IndexError::InvalidArgument(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            IndexError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, IndexError> {
        toml::from_str(text).map_err(|e| IndexError::Serialization(format!("Config: {}", e)))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), IndexError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(threads) = lookup(ENV_THREADS) {
            self.index.threads = threads.trim().parse().map_err(|_| {
                IndexError::InvalidArgument(format!(
                    "{} must be a non-negative integer, got '{}'",
                    ENV_THREADS, threads
                ))
            })?;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
