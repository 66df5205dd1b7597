//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::IndexArgs;
use crate::config::{AppConfig, OutputFormat};
use crate::output;
use crate::progress::LogProgress;
use cpqindex_core::export::compute_blake3_hash;
use cpqindex_core::{
    CanonEngine, Cpq, Index, IndexError, IndexOptions, Ingestor, canonical_checksum,
    export_canonical, import_canonical, verify_canonical,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum graph file size (1 GB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
const MAX_GRAPH_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Maximum canonical export size accepted by `verify` (500 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), IndexError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| IndexError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(IndexError::InvalidArgument(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path, which must name an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, IndexError> {
    let canonical = path.canonicalize().map_err(|e| {
        IndexError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(IndexError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path, whose parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, IndexError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        IndexError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(IndexError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| IndexError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Parse a comma-separated label id list such as `0,2,5`.
pub fn parse_labels(text: &str) -> Result<BTreeSet<u32>, IndexError> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>().map_err(|_| {
                IndexError::InvalidArgument(format!("Invalid label id '{}'", part))
            })
        })
        .collect()
}

/// Merge flags over the configuration into validated engine options.
pub fn index_options(config: &AppConfig, args: &IndexArgs) -> Result<IndexOptions, IndexError> {
    let threads = match args.threads {
        Some(0) => num_cpus::get(),
        Some(threads) => threads,
        None => config.index.resolved_threads(),
    };

    let options = IndexOptions::new(args.k.unwrap_or(config.index.k))
        .with_cores(args.cores || config.index.cores)
        .with_max_intersections(args.intersections.or(config.index.intersections))
        .with_threads(threads)
        .with_oracle_timeout(config.index.oracle_timeout_ms.map(Duration::from_millis));
    options.validate()?;
    Ok(options)
}

/// Load the graph named by `args` and build its index.
pub fn build_index(config: &AppConfig, args: &IndexArgs) -> Result<Index, IndexError> {
    let options = index_options(config, args)?;
    let allowed = args.labels.as_deref().map(parse_labels).transpose()?;

    let path = validate_file_path(&args.data)?;
    validate_file_size(&path, MAX_GRAPH_FILE_SIZE)?;

    tracing::info!("Reading graph from {:?}", path);
    let graph = Ingestor::read_graph_file(&path, allowed.as_ref())?;
    tracing::info!(
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        labels = graph.label_count(),
        "Graph loaded"
    );

    tracing::info!(
        k = options.k,
        cores = options.compute_cores,
        threads = options.threads,
        "Building index"
    );
    let progress = LogProgress::new();
    let index = if options.compute_cores {
        let engine = CanonEngine::with_threads(options.threads, options.oracle_timeout)?;
        let index = Index::build_with_engine(&graph, &options, &engine, &progress)?;
        log_labeling(&engine);
        index
    } else {
        Index::build(&graph, &options, &progress)?
    };
    tracing::info!(
        blocks = index.blocks().len(),
        cores = index.total_cores(),
        "Index built"
    );
    Ok(index)
}

/// Report what the labeling pool did during a build.
fn log_labeling(engine: &CanonEngine) {
    let metrics = engine.pool().metrics();
    let completed = metrics.completed.load(Ordering::Relaxed);
    let total_us = metrics.total_time_us.load(Ordering::Relaxed);
    tracing::info!(
        submitted = metrics.submitted.load(Ordering::Relaxed),
        completed,
        skipped = metrics.skipped.load(Ordering::Relaxed),
        total_ms = total_us / 1000,
        mean_us = total_us.checked_div(completed).unwrap_or(0),
        "Labeling finished"
    );
}

// =============================================================================
// BUILD COMMAND
// =============================================================================

/// Output flags of the `build` command.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub sort: bool,
    pub export: Option<PathBuf>,
}

/// Build an index and print or write it.
pub fn cmd_build(
    config: &AppConfig,
    args: &IndexArgs,
    out: &BuildOutput,
) -> Result<(), IndexError> {
    let mut index = build_index(config, args)?;
    if out.sort || config.output.sort {
        index.sort();
    }

    let format = out.format.unwrap_or(config.output.format);
    let rendered = output::render(&index, format)?;

    match &out.output {
        Some(path) => {
            let validated = validate_output_path(path)?;
            std::fs::write(&validated, rendered.as_bytes())
                .map_err(|e| IndexError::Io(format!("Write file: {}", e)))?;
            tracing::info!("Wrote {} blocks to {:?}", index.blocks().len(), validated);
        }
        None => print!("{}", rendered),
    }

    if let Some(path) = &out.export {
        let validated = validate_output_path(path)?;
        let data = export_canonical(&index)?;
        let digest = compute_blake3_hash(&data);
        std::fs::write(&validated, &data)
            .map_err(|e| IndexError::Io(format!("Write file: {}", e)))?;
        tracing::info!(
            bytes = data.len(),
            checksum = canonical_checksum(&index),
            blake3 = %digest,
            "Exported canonical index to {:?}",
            validated
        );
    }

    Ok(())
}

// =============================================================================
// STATS COMMAND
// =============================================================================

/// Build an index and print its counts.
pub fn cmd_stats(config: &AppConfig, args: &IndexArgs, json_mode: bool) -> Result<(), IndexError> {
    let index = build_index(config, args)?;

    let blocks = index.blocks();
    let pairs: usize = blocks.iter().map(|b| b.pairs().len()).sum();
    let loop_blocks = blocks.iter().filter(|b| b.is_loop()).count();
    let label_sequences: usize = blocks.iter().map(|b| b.labels().len()).sum();
    let checksum = canonical_checksum(&index);

    if json_mode {
        let output = serde_json::json!({
            "k": index.k(),
            "blocks": blocks.len(),
            "loop_blocks": loop_blocks,
            "pairs": pairs,
            "label_sequences": label_sequences,
            "has_cores": index.has_cores(),
            "total_cores": index.total_cores(),
            "unique_cores": index.unique_cores(),
            "checksum": checksum
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("cpqindex Statistics");
    println!("===================");
    println!("Graph: {:?}", args.data);
    println!("K:     {}", index.k());
    println!();
    println!("Blocks:          {}", blocks.len());
    println!("Loop Blocks:     {}", loop_blocks);
    println!("Pairs:           {}", pairs);
    println!("Label Sequences: {}", label_sequences);
    if index.has_cores() {
        println!("Cores:           {}", index.total_cores());
        println!("Unique Cores:    {}", index.unique_cores());
    }
    println!("Checksum:        {}", checksum);

    Ok(())
}

// =============================================================================
// VERIFY COMMAND
// =============================================================================

/// Rebuild the index and compare it with a canonical export.
///
/// A mismatch is reported as an error so the process exits non-zero.
pub fn cmd_verify(
    config: &AppConfig,
    args: &IndexArgs,
    input: &Path,
    json_mode: bool,
) -> Result<(), IndexError> {
    let path = validate_file_path(input)?;
    validate_file_size(&path, MAX_IMPORT_FILE_SIZE)?;
    let data = std::fs::read(&path).map_err(|e| IndexError::Io(format!("Read file: {}", e)))?;
    let imported = import_canonical(&data)?;

    let index = build_index(config, args)?;
    let matches = verify_canonical(&index, &data)?;

    if json_mode {
        let output = serde_json::json!({
            "input": path.to_string_lossy(),
            "blocks": imported.blocks.len(),
            "checksum": imported.checksum(),
            "matches": matches
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!(
            "{}: {} blocks, checksum {}",
            path.display(),
            imported.blocks.len(),
            imported.checksum()
        );
        println!("{}", if matches { "MATCH" } else { "MISMATCH" });
    }

    if !matches {
        return Err(IndexError::InvalidState(format!(
            "Export {:?} does not match the index built from {:?}",
            path, args.data
        )));
    }
    Ok(())
}

// =============================================================================
// CANON COMMAND
// =============================================================================

/// Print the canonical form of one query.
pub fn cmd_canon(
    config: &AppConfig,
    query: &str,
    is_core: bool,
    json_mode: bool,
) -> Result<(), IndexError> {
    let cpq = Cpq::parse(query)?;
    let timeout = config.index.oracle_timeout_ms.map(Duration::from_millis);
    let engine = CanonEngine::with_threads(config.index.resolved_threads(), timeout)?;
    let form = engine.canonicalize(&cpq, is_core)?;

    if json_mode {
        let output = serde_json::json!({
            "query": cpq.to_string(),
            "diameter": cpq.diameter(),
            "canonical": form.to_string_canon(),
            "base64": form.to_base64_canon()
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Query:     {}", cpq);
    println!("Diameter:  {}", cpq.diameter());
    println!("Canonical: {}", form.to_string_canon());
    println!("Base64:    {}", form.to_base64_canon());

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
