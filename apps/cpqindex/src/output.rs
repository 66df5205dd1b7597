//! # Output
//!
//! Renders a built index as a plain listing, a side-by-side table or JSON.

use crate::config::OutputFormat;
use cpqindex_core::{Block, Index, IndexError};
use serde::Serialize;
use std::fmt::Write;

/// One block in the JSON listing.
#[derive(Debug, Serialize)]
pub struct BlockView {
    pub id: u32,
    pub k: usize,
    pub pairs: Vec<(u32, u32)>,
    pub labels: Vec<String>,
    /// Canonical cores, Base64 encoded.
    pub cores: Vec<String>,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            id: block.id().0,
            k: block.k(),
            pairs: block.pairs().iter().map(|p| (p.src, p.trg)).collect(),
            labels: block.labels().iter().map(|l| l.to_string()).collect(),
            cores: block.cores().iter().map(|c| c.to_base64()).collect(),
        }
    }
}

/// The whole index in the JSON listing.
#[derive(Debug, Serialize)]
pub struct IndexView {
    pub k: usize,
    pub block_count: usize,
    pub has_cores: bool,
    pub total_cores: usize,
    pub unique_cores: usize,
    pub blocks: Vec<BlockView>,
}

impl From<&Index> for IndexView {
    fn from(index: &Index) -> Self {
        Self {
            k: index.k(),
            block_count: index.blocks().len(),
            has_cores: index.has_cores(),
            total_cores: index.total_cores(),
            unique_cores: index.unique_cores(),
            blocks: index.blocks().iter().map(BlockView::from).collect(),
        }
    }
}

/// Render `index` in the requested format.
pub fn render(index: &Index, format: OutputFormat) -> Result<String, IndexError> {
    match format {
        OutputFormat::Listing => Ok(render_listing(index)),
        OutputFormat::Table => Ok(index.render_table()),
        OutputFormat::Json => render_json(index),
    }
}

/// Pretty JSON of the block list.
pub fn render_json(index: &Index) -> Result<String, IndexError> {
    serde_json::to_string_pretty(&IndexView::from(index))
        .map_err(|e| IndexError::Serialization(e.to_string()))
}

/// One block after another.
pub fn render_listing(index: &Index) -> String {
    let mut out = String::new();
    for block in index.blocks() {
        let _ = writeln!(
            out,
            "Block {} (k={}, {} pairs)",
            block.id(),
            block.k(),
            block.pairs().len()
        );
        let pairs: Vec<String> = block.pairs().iter().map(|p| p.to_string()).collect();
        let _ = writeln!(out, "  Pairs:  {}", pairs.join(" "));
        let labels: Vec<String> = block.labels().iter().map(|l| l.to_string()).collect();
        let _ = writeln!(out, "  Labels: {}", labels.join(" "));
        if index.has_cores() {
            let _ = writeln!(out, "  Cores:  {}", block.cores().len());
            for core in block.cores() {
                let _ = writeln!(out, "    {}  {}", core.to_base64(), core);
            }
        }
    }
    out
}
