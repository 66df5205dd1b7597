//! # Labeled Graph
//!
//! The directed, edge-labeled input graph.
//!
//! Vertices are the dense range `0..vertex_count`; every vertex exists even
//! when no edge touches it. Edges are unique `(src, trg, label)` triples held
//! in a `BTreeSet` so iteration order is deterministic.

use crate::{IndexError, Label};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// EDGES
// =============================================================================

/// A forward labeled edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Source vertex.
    pub src: u32,
    /// Target vertex.
    pub trg: u32,
    /// Predicate id (always forward).
    pub label: u32,
}

impl Edge {
    /// Create a new edge.
    #[must_use]
    pub const fn new(src: u32, trg: u32, label: u32) -> Self {
        Self { src, trg, label }
    }

    /// The forward label of this edge.
    #[must_use]
    pub const fn forward(&self) -> Label {
        Label::forward(self.label)
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// Directed graph with labeled, de-duplicated edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledGraph {
    vertex_count: u32,
    label_count: u32,
    edges: BTreeSet<Edge>,
}

impl LabeledGraph {
    /// Create a graph with `vertex_count` isolated vertices and labels
    /// `0..label_count`.
    #[must_use]
    pub fn new(vertex_count: u32, label_count: u32) -> Self {
        Self {
            vertex_count,
            label_count,
            edges: BTreeSet::new(),
        }
    }

    /// Insert an edge. Returns false if it was already present.
    ///
    /// Returns `IndexError::InvalidArgument` if a vertex or label is out of range.
    pub fn add_edge(&mut self, src: u32, trg: u32, label: u32) -> Result<bool, IndexError> {
        if src >= self.vertex_count || trg >= self.vertex_count {
            return Err(IndexError::InvalidArgument(format!(
                "edge ({}, {}) references a vertex outside 0..{}",
                src, trg, self.vertex_count
            )));
        }
        if label >= self.label_count {
            return Err(IndexError::InvalidArgument(format!(
                "label {} outside 0..{}",
                label, self.label_count
            )));
        }
        Ok(self.edges.insert(Edge::new(src, trg, label)))
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of declared labels.
    #[must_use]
    pub fn label_count(&self) -> u32 {
        self.label_count
    }

    /// Number of unique edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges in `(src, trg, label)` order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Label ids actually used by at least one edge.
    #[must_use]
    pub fn used_labels(&self) -> BTreeSet<u32> {
        self.edges.iter().map(|e| e.label).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
