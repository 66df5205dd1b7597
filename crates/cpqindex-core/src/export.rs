//! # Canonical Export Module
//!
//! Deterministic, bit-exact listing of a finished index for verification.
//!
//! Block order and run ids depend on how layers were sorted, so the listing
//! drops ids and sorts everything: pairs within a block, label sequences,
//! core hashes, then the blocks themselves. Two builds of the same graph
//! with the same options export byte-identical streams.
//!
//! The listing is for comparing builds, not for reloading an index.

use crate::index::{Block, Index};
use crate::IndexError;
use serde::{Deserialize, Serialize};

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"CPQX";

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Maximum block count accepted on import.
///
/// Prevents memory exhaustion from corrupted data.
pub const MAX_IMPORT_BLOCK_COUNT: u64 = 10_000_000;

/// Maximum total pair count accepted on import.
pub const MAX_IMPORT_PAIR_COUNT: u64 = 100_000_000;

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Index depth.
    pub k: u64,

    /// Number of blocks in the export.
    pub block_count: u64,

    /// Number of pairs over all blocks.
    pub pair_count: u64,

    /// XOR checksum of the data section.
    pub checksum: u64,
}

impl CanonicalHeader {
    /// Create a new header.
    #[must_use]
    pub fn new(k: u64, block_count: u64, pair_count: u64, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            k,
            block_count,
            pair_count,
            checksum,
        }
    }

    /// Validate magic and version.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(IndexError::Serialization("Invalid file format".to_string()));
        }
        if self.version != CANONICAL_VERSION {
            return Err(IndexError::Serialization(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CANONICAL BLOCK (Sorted, Deterministic)
// =============================================================================

/// A block in canonical format.
///
/// Sorted by its pairs, which are disjoint across blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalBlock {
    /// Member pairs as `(src, trg)`, ascending.
    pub pairs: Vec<(u32, u32)>,

    /// Layer the block was built at.
    pub layer: u64,

    /// Label sequences in signed form (`-1 - id` for inverses), ascending.
    pub labels: Vec<Vec<i32>>,

    /// Binary canonical core hashes, ascending.
    pub cores: Vec<Vec<u8>>,
}

impl From<&Block> for CanonicalBlock {
    fn from(block: &Block) -> Self {
        let mut pairs: Vec<(u32, u32)> = block.pairs().iter().map(|p| (p.src, p.trg)).collect();
        pairs.sort_unstable();

        // BTreeSet order already matches the sequence order
        let labels = block
            .labels()
            .iter()
            .map(|sequence| sequence.labels().iter().map(|l| l.signed()).collect())
            .collect();

        let cores = block
            .core_hashes()
            .iter()
            .map(|hash| hash.as_bytes().to_vec())
            .collect();

        Self {
            pairs,
            layer: block.k() as u64,
            labels,
            cores,
        }
    }
}

/// An index in canonical format for bit-exact serialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalIndex {
    /// Index depth.
    pub k: u64,

    /// Blocks sorted by pairs.
    pub blocks: Vec<CanonicalBlock>,
}

impl CanonicalIndex {
    /// Create the canonical listing of an index.
    #[must_use]
    pub fn from_index(index: &Index) -> Self {
        let mut blocks: Vec<CanonicalBlock> =
            index.blocks().iter().map(CanonicalBlock::from).collect();
        blocks.sort();
        Self {
            k: index.k() as u64,
            blocks,
        }
    }

    /// Total pairs over all blocks.
    #[must_use]
    pub fn pair_count(&self) -> u64 {
        self.blocks.iter().map(|b| b.pairs.len() as u64).sum()
    }

    /// Compute a deterministic checksum of the data.
    ///
    /// XOR-based, for detecting accidental corruption only. It is not
    /// collision resistant; enable `crypto-hash` for a BLAKE3 digest.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hash: u64 = 0;

        for (position, block) in self.blocks.iter().enumerate() {
            hash ^= (position as u64).rotate_left(31);
            hash ^= block.layer.rotate_left(3);
            for &(src, trg) in &block.pairs {
                hash ^= u64::from(src).rotate_left(13);
                hash ^= u64::from(trg).rotate_left(7);
            }
            for sequence in &block.labels {
                hash ^= (sequence.len() as u64).rotate_left(19);
                for (i, &label) in sequence.iter().enumerate() {
                    hash ^= (label as u64).rotate_left(((i as u32) * 5 + 11) % 64);
                }
            }
            for core in &block.cores {
                for (i, &byte) in core.iter().enumerate() {
                    hash ^= u64::from(byte).rotate_left(((i as u32) * 8 + 23) % 64);
                }
            }
        }

        hash ^= self.k.rotate_left(29);
        hash
    }
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export an index to canonical postcard format.
///
/// Format:
/// ```text
/// [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalIndex (postcard)]
/// ```
///
/// # Errors
///
/// Returns `IndexError::Serialization` if serialization fails.
pub fn export_canonical(index: &Index) -> Result<Vec<u8>, IndexError> {
    let canonical = CanonicalIndex::from_index(index);
    let header = CanonicalHeader::new(
        canonical.k,
        canonical.blocks.len() as u64,
        canonical.pair_count(),
        canonical.checksum(),
    );

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| IndexError::Serialization(format!("Header: {}", e)))?;
    let data_bytes = postcard::to_allocvec(&canonical)
        .map_err(|e| IndexError::Serialization(format!("Data: {}", e)))?;

    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| IndexError::Serialization("Header too large".to_string()))?;
    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&header_len.to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);

    Ok(result)
}

/// Decode a canonical export, checking header, limits and checksum.
///
/// # Errors
///
/// Returns `IndexError::Serialization` if the data is malformed or corrupted.
pub fn import_canonical(data: &[u8]) -> Result<CanonicalIndex, IndexError> {
    let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
        return Err(IndexError::Serialization("Data too short".to_string()));
    };
    let header_len = u32::from_le_bytes(*len_bytes) as usize;

    if rest.len() < header_len {
        return Err(IndexError::Serialization(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, data_bytes) = rest.split_at(header_len);

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| IndexError::Serialization(format!("Header: {}", e)))?;
    header.validate()?;

    // Validate size limits BEFORE deserializing the listing
    if header.block_count > MAX_IMPORT_BLOCK_COUNT {
        return Err(IndexError::Serialization(format!(
            "Block count {} exceeds maximum allowed {}",
            header.block_count, MAX_IMPORT_BLOCK_COUNT
        )));
    }
    if header.pair_count > MAX_IMPORT_PAIR_COUNT {
        return Err(IndexError::Serialization(format!(
            "Pair count {} exceeds maximum allowed {}",
            header.pair_count, MAX_IMPORT_PAIR_COUNT
        )));
    }

    let canonical: CanonicalIndex = postcard::from_bytes(data_bytes)
        .map_err(|e| IndexError::Serialization(format!("Data: {}", e)))?;

    let computed = canonical.checksum();
    if computed != header.checksum {
        return Err(IndexError::Serialization(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    if canonical.k != header.k {
        return Err(IndexError::Serialization("Depth mismatch".to_string()));
    }
    if canonical.blocks.len() as u64 != header.block_count {
        return Err(IndexError::Serialization(
            "Block count mismatch".to_string(),
        ));
    }
    if canonical.pair_count() != header.pair_count {
        return Err(IndexError::Serialization(
            "Pair count mismatch".to_string(),
        ));
    }

    Ok(canonical)
}

/// Check that an index matches a canonical export.
pub fn verify_canonical(index: &Index, canonical_data: &[u8]) -> Result<bool, IndexError> {
    let imported = import_canonical(canonical_data)?;
    Ok(imported == CanonicalIndex::from_index(index))
}

/// Canonical checksum of an index, for quick comparisons.
#[must_use]
pub fn canonical_checksum(index: &Index) -> u64 {
    CanonicalIndex::from_index(index).checksum()
}

// =============================================================================
// CRYPTOGRAPHIC HASH SUPPORT
// =============================================================================

/// BLAKE3 digest of the canonical export, as 64 hex characters.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
pub fn canonical_crypto_hash(index: &Index) -> Result<String, IndexError> {
    let data = export_canonical(index)?;
    Ok(compute_blake3_hash(&data))
}

/// Check an index against a BLAKE3 digest of its canonical export.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
pub fn verify_crypto_hash(index: &Index, expected_hash: &str) -> Result<bool, IndexError> {
    Ok(canonical_crypto_hash(index)? == expected_hash)
}

/// BLAKE3 digest of raw bytes, as 64 hex characters.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================
