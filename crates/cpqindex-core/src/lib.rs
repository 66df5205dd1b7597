//! # cpqindex-core
//!
//! The deterministic index engine for cpqindex.
//!
//! Builds a CPQ-native index over a directed, edge-labeled graph: vertex
//! pairs are partitioned by k-path-bisimulation, each equivalence class
//! becomes a block, and every block can optionally be described by the
//! canonical forms of the conjunctive path queries (CPQs) it answers.
//!
//! ## Pipeline
//!
//! 1. `ingestor` reads the graph text format into a `LabeledGraph`.
//! 2. `partition` layers vertex pairs by walk length and groups them.
//! 3. `index` turns the layers into final blocks and computes cores.
//! 4. `canon` hands every core to the labeling pool for its canonical form.
//! 5. `export` writes a sorted, checksummed listing for verification.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: ordered collections only; results never depend on timing
//! - The only concurrency is the canonical labeling pool
//! - No logging: progress is reported through `ProgressListener`

// =============================================================================
// MODULES
// =============================================================================

pub mod canon;
pub mod cpq;
pub mod export;
pub mod formats;
pub mod graph;
pub mod index;
pub mod ingestor;
pub mod partition;
pub mod primitives;
pub mod progress;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{IndexError, Label, LabelSequence, Pair, SegmentId};

// =============================================================================
// RE-EXPORTS: Index Engine
// =============================================================================

pub use canon::{
    CanonEngine, CanonForm, CanonicalLabeler, ColoredGraph, CoreHash, LabelingPool,
    LabelingPoolConfig, LabelingTask, PendingCanon, RefinementLabeler,
};
pub use cpq::{Cpq, QueryGraph};
pub use export::{
    CanonicalBlock, CanonicalHeader, CanonicalIndex, canonical_checksum, export_canonical,
    import_canonical, verify_canonical,
};
pub use graph::{Edge, LabeledGraph};
pub use index::{Block, Core, Index, IndexOptions};
pub use ingestor::Ingestor;
pub use partition::{Partition, PathPair, Segment, SegmentRef};
pub use progress::{NoProgress, ProgressListener};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{BitReader, BitWriter, binary_string};
