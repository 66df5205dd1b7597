//! # Progress Logging
//!
//! Turns engine progress notifications into `tracing` events.

use cpqindex_core::ProgressListener;
use std::cell::Cell;
use std::time::Instant;

/// Logs construction progress with per-phase timings.
#[derive(Debug, Default)]
pub struct LogProgress {
    partition: Cell<Option<Instant>>,
    combination: Cell<Option<Instant>>,
    blocks: Cell<Option<Instant>>,
    cores: Cell<Option<Instant>>,
    map: Cell<Option<Instant>>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

fn start(slot: &Cell<Option<Instant>>) {
    slot.set(Some(Instant::now()));
}

/// Milliseconds since the matching start, or 0 if there was none.
fn finish(slot: &Cell<Option<Instant>>) -> u64 {
    slot.take()
        .map(|started| started.elapsed().as_millis() as u64)
        .unwrap_or(0)
}

impl ProgressListener for LogProgress {
    fn partition_start(&self, k: usize) {
        start(&self.partition);
        tracing::info!(layer = k, "Partitioning layer");
    }

    fn partition_end(&self, k: usize) {
        let elapsed_ms = finish(&self.partition);
        tracing::info!(layer = k, elapsed_ms, "Partitioned layer");
    }

    fn combination_start(&self, k1: usize, k2: usize) {
        start(&self.combination);
        tracing::debug!(k1, k2, "Joining layers");
    }

    fn combination_end(&self, k1: usize, k2: usize) {
        let elapsed_ms = finish(&self.combination);
        tracing::debug!(k1, k2, elapsed_ms, "Joined layers");
    }

    fn blocks_start(&self, k: usize) {
        start(&self.blocks);
        tracing::info!(layer = k, "Building blocks");
    }

    fn blocks_end(&self, k: usize) {
        let elapsed_ms = finish(&self.blocks);
        tracing::info!(layer = k, elapsed_ms, "Built blocks");
    }

    fn cores_start(&self, k: usize) {
        start(&self.cores);
        tracing::info!(layer = k, "Computing cores");
    }

    fn cores_end(&self, k: usize) {
        let elapsed_ms = finish(&self.cores);
        tracing::info!(layer = k, elapsed_ms, "Computed cores");
    }

    fn cores_blocks_done(&self, done: usize, total: usize) {
        tracing::info!(done, total, "Core progress");
    }

    fn map_start(&self) {
        start(&self.map);
        tracing::info!("Mapping cores to blocks");
    }

    fn map_end(&self) {
        let elapsed_ms = finish(&self.map);
        tracing::info!(elapsed_ms, "Mapped cores to blocks");
    }
}
