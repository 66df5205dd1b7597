//! Canonical forms and their encodings.

use super::colored::ColoredGraph;
use crate::formats::{BitReader, BitWriter};
use crate::primitives::{MAX_CANON_LABEL, MAX_CANON_NODES, MAX_LABEL_BITS, MAX_VERTEX_BITS};
use crate::IndexError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Bits needed to address one of `n` nodes: `ceil(log2(n))`, zero for `n <= 1`.
#[must_use]
pub fn vertex_bits(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

// =============================================================================
// CORE HASH
// =============================================================================

/// The binary canonical encoding of a core, used as its identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoreHash(Vec<u8>);

impl CoreHash {
    /// Raw encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Standard Base64 rendering.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Parse a Base64 rendering.
    pub fn from_base64(text: &str) -> Result<Self, IndexError> {
        STANDARD
            .decode(text.trim())
            .map(Self)
            .map_err(|e| IndexError::Serialization(format!("invalid base64 core: {}", e)))
    }
}

impl fmt::Display for CoreHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

// =============================================================================
// CANONICAL FORM
// =============================================================================

/// A graph in canonical vertex numbering.
///
/// The binary encoding is computed once at construction; equality and
/// hashing use it exclusively.
#[derive(Debug, Clone)]
pub struct CanonForm {
    source: u32,
    target: u32,
    /// `(label id, node count)`, ascending by label id.
    labels: Vec<(u32, u32)>,
    /// Sorted out-neighbours per canonical position.
    graph: Vec<Vec<u32>>,
    binary: CoreHash,
}

impl CanonForm {
    /// Assemble a form from parts already in canonical numbering.
    ///
    /// Rows are sorted here. Fails with `IndexError::EncodingLimit` when the
    /// form does not fit the fixed binary field widths.
    pub fn from_parts(
        source: u32,
        target: u32,
        labels: Vec<(u32, u32)>,
        mut graph: Vec<Vec<u32>>,
    ) -> Result<Self, IndexError> {
        for row in &mut graph {
            row.sort_unstable();
        }
        let binary = encode(source, target, &labels, &graph)?;
        Ok(Self {
            source,
            target,
            labels,
            graph,
            binary,
        })
    }

    /// Apply an oracle relabeling to a colored graph.
    ///
    /// `relabeling[i]` is the original node placed at canonical position `i`.
    pub fn from_labeling(graph: &ColoredGraph, relabeling: &[u32]) -> Result<Self, IndexError> {
        let n = graph.node_count();
        if relabeling.len() != n {
            return Err(IndexError::OracleFailure(format!(
                "relabeling has {} entries for {} nodes",
                relabeling.len(),
                n
            )));
        }

        let mut inverse = vec![u32::MAX; n];
        for (position, &node) in relabeling.iter().enumerate() {
            let slot = inverse.get_mut(node as usize).ok_or_else(|| {
                IndexError::OracleFailure(format!("relabeling names unknown node {}", node))
            })?;
            if *slot != u32::MAX {
                return Err(IndexError::OracleFailure(format!(
                    "relabeling places node {} twice",
                    node
                )));
            }
            *slot = position as u32;
        }

        let adjacency = graph.adjacency();
        let rows = relabeling
            .iter()
            .map(|&node| {
                adjacency[node as usize]
                    .iter()
                    .map(|&neighbour| inverse[neighbour as usize])
                    .collect()
            })
            .collect();

        Self::from_parts(
            inverse[graph.source() as usize],
            inverse[graph.target() as usize],
            graph.label_counts().collect(),
            rows,
        )
    }

    /// Decode a binary canonical form.
    pub fn from_binary(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut reader = BitReader::new(bytes);
        let n = reader.read(MAX_VERTEX_BITS)? as usize;
        let vb = vertex_bits(n);

        let source = reader.read(vb)?;
        let target = reader.read(vb)?;

        let label_classes = reader.read(MAX_LABEL_BITS)?;
        let mut labels = Vec::with_capacity(label_classes as usize);
        for _ in 0..label_classes {
            let label = reader.read(MAX_LABEL_BITS)?;
            let count = reader.read(vb)?;
            labels.push((label, count));
        }

        let mut graph = Vec::with_capacity(n);
        for _ in 0..n {
            let degree = reader.read(vb)?;
            let row = (0..degree)
                .map(|_| reader.read(vb))
                .collect::<Result<Vec<_>, _>>()?;
            graph.push(row);
        }

        if reader.remaining() >= 8 {
            return Err(IndexError::Serialization(format!(
                "{} trailing bits after canonical form",
                reader.remaining()
            )));
        }

        Self::from_parts(source, target, labels, graph)
    }

    /// Canonical source position.
    #[must_use]
    pub fn source(&self) -> u32 {
        self.source
    }

    /// Canonical target position.
    #[must_use]
    pub fn target(&self) -> u32 {
        self.target
    }

    /// `(label id, count)` pairs.
    #[must_use]
    pub fn labels(&self) -> &[(u32, u32)] {
        &self.labels
    }

    /// Sorted adjacency rows.
    #[must_use]
    pub fn graph(&self) -> &[Vec<u32>] {
        &self.graph
    }

    /// The binary encoding as a hash key.
    #[must_use]
    pub fn core_hash(&self) -> &CoreHash {
        &self.binary
    }

    /// Consume the form, keeping only its hash.
    #[must_use]
    pub fn into_hash(self) -> CoreHash {
        self.binary
    }

    /// The binary encoding.
    #[must_use]
    pub fn to_binary_canon(&self) -> &[u8] {
        self.binary.as_bytes()
    }

    /// Base64 of the binary encoding.
    #[must_use]
    pub fn to_base64_canon(&self) -> String {
        self.binary.to_base64()
    }

    /// Diagnostic rendering, e.g. `s=0,t=1,l0=1,e0={2},e1={},e2={1}`.
    #[must_use]
    pub fn to_string_canon(&self) -> String {
        let mut parts = vec![format!("s={}", self.source), format!("t={}", self.target)];
        parts.extend(self.labels.iter().map(|(l, c)| format!("l{}={}", l, c)));
        parts.extend(self.graph.iter().enumerate().map(|(i, row)| {
            let neighbours: Vec<String> = row.iter().map(u32::to_string).collect();
            format!("e{}={{{}}}", i, neighbours.join(","))
        }));
        parts.join(",")
    }
}

impl PartialEq for CanonForm {
    fn eq(&self, other: &Self) -> bool {
        self.binary == other.binary
    }
}

impl Eq for CanonForm {}

impl Hash for CanonForm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.binary.hash(state);
    }
}

impl fmt::Display for CanonForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_canon())
    }
}

// =============================================================================
// BINARY LAYOUT
// =============================================================================

fn encode(
    source: u32,
    target: u32,
    labels: &[(u32, u32)],
    graph: &[Vec<u32>],
) -> Result<CoreHash, IndexError> {
    let n = graph.len();
    if n > MAX_CANON_NODES {
        return Err(IndexError::EncodingLimit(format!(
            "{} nodes exceed the {}-bit vertex field",
            n, MAX_VERTEX_BITS
        )));
    }
    if labels.len() > MAX_CANON_LABEL as usize {
        return Err(IndexError::EncodingLimit(format!(
            "{} label classes exceed the {}-bit label field",
            labels.len(),
            MAX_LABEL_BITS
        )));
    }
    if let Some((label, _)) = labels.iter().find(|(label, _)| *label > MAX_CANON_LABEL) {
        return Err(IndexError::EncodingLimit(format!(
            "label id {} exceeds {}",
            label, MAX_CANON_LABEL
        )));
    }

    let vb = vertex_bits(n) as usize;
    let edges: usize = graph.iter().map(Vec::len).sum();
    let bits = MAX_VERTEX_BITS as usize
        + 2 * vb
        + MAX_LABEL_BITS as usize
        + labels.len() * (MAX_LABEL_BITS as usize + vb)
        + n * vb
        + edges * vb;

    let vb = vb as u32;
    let mut out = BitWriter::new(bits);
    out.write(n as u32, MAX_VERTEX_BITS)?;
    out.write(source, vb)?;
    out.write(target, vb)?;
    out.write(labels.len() as u32, MAX_LABEL_BITS)?;
    for &(label, count) in labels {
        out.write(label, MAX_LABEL_BITS)?;
        out.write(count, vb)?;
    }
    for row in graph {
        out.write(row.len() as u32, vb)?;
        for &neighbour in row {
            out.write(neighbour, vb)?;
        }
    }

    Ok(CoreHash(out.into_bytes()))
}

// =============================================================================
// TESTS
// =============================================================================
