//! # Innate Primitives
//!
//! Fixed constants for the cpqindex engine.
//!
//! These are compiled into the binary and are immutable at runtime. The
//! binary canonical form depends on the field widths below, so changing any
//! of them changes every stored core hash.

/// Width in bits of the vertex count field of a binary canonical form.
///
/// A canonical graph (query vertices plus one node per query edge) must
/// therefore hold fewer than `1 << MAX_VERTEX_BITS` nodes.
pub const MAX_VERTEX_BITS: u32 = 10;

/// Width in bits of the label-class count and of each label id.
///
/// Label ids above `(1 << MAX_LABEL_BITS) - 1` cannot be encoded.
pub const MAX_LABEL_BITS: u32 = 5;

/// Largest node count a binary canonical form can describe.
pub const MAX_CANON_NODES: usize = (1 << MAX_VERTEX_BITS) - 1;

/// Largest label id (and label-class count) a binary canonical form can describe.
pub const MAX_CANON_LABEL: u32 = (1 << MAX_LABEL_BITS) - 1;

/// Largest single write accepted by the bit codec.
pub const MAX_FIELD_WIDTH: u32 = 32;

// =============================================================================
// INDEX
// =============================================================================

/// Default bisimulation depth (longest indexed path).
pub const DEFAULT_K: usize = 2;

/// Separator cell of a rendered index table.
pub const TABLE_SEPARATOR: &str = "-----";

/// Minimum width of a block column in a rendered index table.
pub const TABLE_MIN_COLUMN: usize = 5;

// =============================================================================
// LABELING POOL
// =============================================================================

/// Default number of labeling worker threads.
pub const DEFAULT_LABELING_THREADS: usize = 1;

/// Pending labeling requests allowed per worker before submission blocks.
pub const LABELING_QUEUE_PER_WORKER: usize = 256;

/// How often idle labeling workers re-check the shutdown flag (milliseconds).
pub const WORKER_POLL_INTERVAL_MS: u64 = 100;

/// Stack size for labeling workers (search recursion is bounded by node count).
pub const WORKER_STACK_SIZE: usize = 4 * 1024 * 1024;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of vertices accepted from a graph header.
///
/// Prevents memory exhaustion from a malformed header.
pub const MAX_GRAPH_VERTICES: u32 = 50_000_000;

/// Maximum number of distinct labels accepted from a graph header.
pub const MAX_GRAPH_LABELS: u32 = 1_000_000;
