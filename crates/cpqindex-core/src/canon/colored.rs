//! Vertex-colored graphs handed to the labeling oracle.

use crate::cpq::QueryGraph;
use std::collections::BTreeMap;

/// A query graph with every edge label moved onto its own node.
///
/// Query vertices keep their ids `0..V`; the `j`-th edge (in edge order)
/// becomes node `V + j` with arcs `src -> V + j -> trg`. All structure is
/// then carried by node colors:
/// - the source
/// - the target, unless it equals the source
/// - one class per label id, holding that label's edge nodes
/// - every remaining query vertex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColoredGraph {
    adjacency: Vec<Vec<u32>>,
    source: u32,
    target: u32,
    /// Label id to its edge nodes, ascending by label id.
    labels: BTreeMap<u32, Vec<u32>>,
    unlabeled: Vec<u32>,
}

impl ColoredGraph {
    /// Build from a (usually retracted) query graph.
    #[must_use]
    pub fn from_query_graph(graph: &QueryGraph) -> Self {
        let vertices = graph.vertex_count();
        let mut adjacency = vec![Vec::new(); vertices as usize + graph.edge_count()];
        let mut labels: BTreeMap<u32, Vec<u32>> = BTreeMap::new();

        for (edge_node, edge) in (vertices..).zip(graph.edges()) {
            adjacency[edge.src as usize].push(edge_node);
            adjacency[edge_node as usize].push(edge.trg);
            labels.entry(edge.label).or_default().push(edge_node);
        }

        let unlabeled = (0..vertices)
            .filter(|&v| v != graph.source() && v != graph.target())
            .collect();

        Self {
            adjacency,
            source: graph.source(),
            target: graph.target(),
            labels,
            unlabeled,
        }
    }

    /// Total node count (query vertices plus edge nodes).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Out-neighbours of every node.
    #[must_use]
    pub fn adjacency(&self) -> &[Vec<u32>] {
        &self.adjacency
    }

    /// Source node.
    #[must_use]
    pub fn source(&self) -> u32 {
        self.source
    }

    /// Target node.
    #[must_use]
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Number of edge nodes per label id, ascending by id.
    pub fn label_counts(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.labels
            .iter()
            .map(|(&label, nodes)| (label, nodes.len() as u32))
    }

    /// The non-empty color classes in oracle order.
    #[must_use]
    pub fn color_classes(&self) -> Vec<Vec<u32>> {
        let mut classes = vec![vec![self.source]];
        if self.target != self.source {
            classes.push(vec![self.target]);
        }
        classes.extend(self.labels.values().cloned());
        if !self.unlabeled.is_empty() {
            classes.push(self.unlabeled.clone());
        }
        classes
    }

    /// Flat color encoding: each class lists its 1-based node indices, with
    /// the last index of the class negated.
    #[must_use]
    pub fn color_encoding(&self) -> Vec<i32> {
        let mut colors = Vec::with_capacity(self.node_count());
        for class in self.color_classes() {
            let last = class.len().saturating_sub(1);
            for (i, &node) in class.iter().enumerate() {
                let one_based = node as i32 + 1;
                colors.push(if i == last { -one_based } else { one_based });
            }
        }
        colors
    }
}

// =============================================================================
// TESTS
// =============================================================================
