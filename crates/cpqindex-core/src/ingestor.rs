//! # Ingestor Module
//!
//! Text graph loading for the index engine.
//!
//! Format:
//! - line 1: `<vertexCount> <edgeCount> <labelCount>`
//! - each following line: `<src> <trg> <label>` (forward direction only)
//!
//! - Every vertex `0..vertexCount` is registered, referenced or not
//! - Malformed lines are rejected with their line number; no partial graph
//!   is returned
//! - Repeated edges collapse into one

use crate::graph::LabeledGraph;
use crate::primitives::{MAX_GRAPH_LABELS, MAX_GRAPH_VERTICES};
use crate::IndexError;
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// The Ingestor parses and validates graph text.
pub struct Ingestor;

impl Ingestor {
    /// Read a graph, keeping every label.
    pub fn read_graph<R: BufRead>(reader: R) -> Result<LabeledGraph, IndexError> {
        Self::read_graph_filtered(reader, None)
    }

    /// Read a graph from a string.
    pub fn read_graph_str(text: &str) -> Result<LabeledGraph, IndexError> {
        Self::read_graph(text.as_bytes())
    }

    /// Read a graph file.
    pub fn read_graph_file(
        path: &Path,
        allowed_labels: Option<&BTreeSet<u32>>,
    ) -> Result<LabeledGraph, IndexError> {
        let file = std::fs::File::open(path).map_err(|e| {
            IndexError::Io(format!("Cannot open graph file '{}': {}", path.display(), e))
        })?;
        Self::read_graph_filtered(BufReader::new(file), allowed_labels)
    }

    /// Read a graph, skipping edges whose label is not in `allowed_labels`.
    ///
    /// Filtered edges are still validated.
    pub fn read_graph_filtered<R: BufRead>(
        reader: R,
        allowed_labels: Option<&BTreeSet<u32>>,
    ) -> Result<LabeledGraph, IndexError> {
        let mut lines = reader.lines().enumerate();

        let (vertices, labels) = match lines.next() {
            Some((_, line)) => Self::parse_header(&line?)?,
            None => {
                return Err(IndexError::Format {
                    line: 1,
                    message: "missing header line".to_string(),
                });
            }
        };

        let mut graph = LabeledGraph::new(vertices, labels);
        for (idx, line) in lines {
            let line = line?;
            let number = idx + 1;
            if line.trim().is_empty() {
                continue;
            }

            let [src, trg, label] = Self::parse_fields(&line, number)?;
            if src >= vertices || trg >= vertices {
                return Err(IndexError::Format {
                    line: number,
                    message: format!("vertex out of range 0..{}", vertices),
                });
            }
            if label >= labels {
                return Err(IndexError::Format {
                    line: number,
                    message: format!("label {} out of range 0..{}", label, labels),
                });
            }

            if allowed_labels.is_some_and(|allowed| !allowed.contains(&label)) {
                continue;
            }

            graph.add_edge(src, trg, label)?;
        }

        Ok(graph)
    }

    /// Parse `<vertexCount> <edgeCount> <labelCount>`.
    ///
    /// The edge count is informational and not enforced.
    fn parse_header(line: &str) -> Result<(u32, u32), IndexError> {
        let [vertices, _edges, labels] = Self::parse_fields(line, 1)?;

        if vertices > MAX_GRAPH_VERTICES {
            return Err(IndexError::Format {
                line: 1,
                message: format!("vertex count {} exceeds {}", vertices, MAX_GRAPH_VERTICES),
            });
        }
        if labels > MAX_GRAPH_LABELS {
            return Err(IndexError::Format {
                line: 1,
                message: format!("label count {} exceeds {}", labels, MAX_GRAPH_LABELS),
            });
        }

        Ok((vertices, labels))
    }

    /// Split a line into exactly three unsigned integers.
    fn parse_fields(line: &str, number: usize) -> Result<[u32; 3], IndexError> {
        let mut fields = [0u32; 3];
        let mut parts = line.split_whitespace();

        for field in &mut fields {
            let token = parts.next().ok_or_else(|| IndexError::Format {
                line: number,
                message: "expected three integers".to_string(),
            })?;
            *field = token.parse().map_err(|_| IndexError::Format {
                line: number,
                message: format!("'{}' is not a non-negative integer", token),
            })?;
        }

        if parts.next().is_some() {
            return Err(IndexError::Format {
                line: number,
                message: "trailing data after three integers".to_string(),
            });
        }

        Ok(fields)
    }
}

// =============================================================================
// TESTS
// =============================================================================
