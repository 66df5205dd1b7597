//! # Core Type Definitions
//!
//! This module contains the value types shared by every stage of index
//! construction:
//! - Vertex pairs (`Pair`) used as keys for segments and blocks
//! - Edge labels (`Label`) and ordered label sequences (`LabelSequence`)
//! - Segment / block identifiers (`SegmentId`)
//! - Error types (`IndexError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Are immutable once constructed

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// VERTEX PAIRS
// =============================================================================

/// A source/target vertex pair.
///
/// Ordered lexicographically by `(src, trg)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pair {
    /// Source vertex.
    pub src: u32,
    /// Target vertex.
    pub trg: u32,
}

impl Pair {
    /// Create a new pair.
    #[must_use]
    pub const fn new(src: u32, trg: u32) -> Self {
        Self { src, trg }
    }

    /// True if source and target are the same vertex.
    #[must_use]
    pub const fn is_loop(&self) -> bool {
        self.src == self.trg
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.src, self.trg)
    }
}

// =============================================================================
// LABELS
// =============================================================================

/// An edge label, either a forward predicate or its inverse.
///
/// Ordered by `(id, inverse)`, so `0 < 0⁻ < 1 < 1⁻ < 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
    id: u32,
    inverse: bool,
}

impl Label {
    /// A forward label with the given predicate id.
    #[must_use]
    pub const fn forward(id: u32) -> Self {
        Self { id, inverse: false }
    }

    /// The inverse of the predicate with the given id.
    #[must_use]
    pub const fn inverse_of(id: u32) -> Self {
        Self { id, inverse: true }
    }

    /// Decode the signed form: non-negative is forward, `-id - 1` is inverse.
    #[must_use]
    pub const fn from_signed(value: i32) -> Self {
        if value >= 0 {
            Self::forward(value as u32)
        } else {
            Self::inverse_of((-(value + 1)) as u32)
        }
    }

    /// Predicate id, regardless of direction.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// True for an inverse label.
    #[must_use]
    pub const fn is_inverse(&self) -> bool {
        self.inverse
    }

    /// The same predicate traversed in the opposite direction.
    #[must_use]
    pub const fn inverse(&self) -> Self {
        Self {
            id: self.id,
            inverse: !self.inverse,
        }
    }

    /// Signed encoding: forward = `id`, inverse = `-id - 1`.
    #[must_use]
    pub const fn signed(&self) -> i32 {
        if self.inverse {
            -(self.id as i32) - 1
        } else {
            self.id as i32
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverse {
            write!(f, "{}⁻", self.id)
        } else {
            write!(f, "{}", self.id)
        }
    }
}

// =============================================================================
// LABEL SEQUENCES
// =============================================================================

/// A non-empty ordered sequence of labels.
///
/// Ordered first by length, then lexicographically by label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSequence(Vec<Label>);

impl LabelSequence {
    /// A sequence holding one label.
    #[must_use]
    pub fn single(label: Label) -> Self {
        Self(vec![label])
    }

    /// Build a sequence from labels. Fails on an empty slice.
    pub fn from_labels(labels: &[Label]) -> Result<Self, IndexError> {
        if labels.is_empty() {
            return Err(IndexError::InvalidArgument(
                "label sequence must not be empty".to_string(),
            ));
        }
        Ok(Self(labels.to_vec()))
    }

    /// `prefix` followed by every label of `suffix`.
    #[must_use]
    pub fn concat(prefix: &Self, suffix: &Self) -> Self {
        let mut labels = Vec::with_capacity(prefix.0.len() + suffix.0.len());
        labels.extend_from_slice(&prefix.0);
        labels.extend_from_slice(&suffix.0);
        Self(labels)
    }

    /// The labels in order.
    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.0
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; sequences are non-empty by construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Ord for LabelSequence {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for LabelSequence {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LabelSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.0 {
            write!(f, "{}", label)?;
        }
        Ok(())
    }
}

// =============================================================================
// SEGMENT / BLOCK IDENTIFIERS
// =============================================================================

/// Identifier shared by all segments of one equivalence run.
///
/// Ids increase strictly across layers, so a block built from a run is
/// identified by the same value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SegmentId(pub u32);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while loading graphs or building an index.
///
/// - No silent failures
/// - Use `Result<T, IndexError>` for fallible operations
/// - The engine never panics; all errors are returned to the caller
#[derive(Debug, Error)]
pub enum IndexError {
    /// An argument is outside its valid range (e.g. `k < 1`).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Graph text input could not be parsed.
    #[error("Format error on line {line}: {message}")]
    Format {
        /// 1-based input line.
        line: usize,
        /// What was wrong with it.
        message: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A canonical form does not fit the fixed-width binary fields.
    #[error("Encoding limit exceeded: {0}")]
    EncodingLimit(String),

    /// A bit codec write went past the pre-sized buffer.
    #[error("Bit buffer overflow: capacity {capacity} bits, write ends at bit {requested}")]
    BitOverflow {
        /// Buffer capacity in bits.
        capacity: usize,
        /// Bit position the write would end at.
        requested: usize,
    },

    /// The labeling oracle failed to compute a labeling.
    #[error("Labeling oracle failure: {0}")]
    OracleFailure(String),

    /// A bounded wait on the labeling oracle expired.
    #[error("Labeling oracle timed out after {0:?}")]
    OracleTimeout(Duration),

    /// The labeling request was cancelled.
    #[error("Labeling request cancelled")]
    OracleCancelled,

    /// The labeling pool no longer accepts work.
    #[error("Labeling pool has shut down")]
    PoolShutdown,

    /// An operation is not valid in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(labels: &[i32]) -> LabelSequence {
        let labels: Vec<Label> = labels.iter().map(|&l| Label::from_signed(l)).collect();
        LabelSequence::from_labels(&labels).expect("non-empty")
    }

    #[test]
    fn pair_ordering_is_lexicographic() {
        let mut pairs = vec![Pair::new(1, 0), Pair::new(0, 2), Pair::new(0, 1)];
        pairs.sort();
        assert_eq!(pairs, vec![Pair::new(0, 1), Pair::new(0, 2), Pair::new(1, 0)]);
        assert!(Pair::new(3, 3).is_loop());
        assert_eq!(Pair::new(4, 6).to_string(), "(4,6)");
    }

    #[test]
    fn label_order_interleaves_inverses() {
        let mut labels = vec![
            Label::forward(1),
            Label::inverse_of(0),
            Label::forward(2),
            Label::forward(0),
            Label::inverse_of(1),
        ];
        labels.sort();
        let shown: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        assert_eq!(shown, vec!["0", "0⁻", "1", "1⁻", "2"]);
    }

    #[test]
    fn label_signed_encoding() {
        assert_eq!(Label::forward(3).signed(), 3);
        assert_eq!(Label::inverse_of(0).signed(), -1);
        assert_eq!(Label::inverse_of(3).signed(), -4);
        assert_eq!(Label::from_signed(-4), Label::inverse_of(3));
        assert_eq!(Label::forward(2).inverse(), Label::inverse_of(2));
    }

    #[test]
    fn sequences_order_by_length_first() {
        let mut seqs = vec![seq(&[1, 1]), seq(&[2]), seq(&[0, -1]), seq(&[0, 0])];
        seqs.sort();
        let shown: Vec<String> = seqs.iter().map(|s| s.to_string()).collect();
        assert_eq!(shown, vec!["2", "00", "00⁻", "11"]);
    }

    #[test]
    fn empty_sequence_rejected() {
        assert!(matches!(
            LabelSequence::from_labels(&[]),
            Err(IndexError::InvalidArgument(_))
        ));
    }

    #[test]
    fn concat_appends_in_order() {
        let joined = LabelSequence::concat(&seq(&[0, -1]), &seq(&[2]));
        assert_eq!(joined.to_string(), "00⁻2");
        assert_eq!(joined.len(), 3);
    }
}
