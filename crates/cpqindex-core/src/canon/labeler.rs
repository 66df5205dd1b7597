//! Canonical labeling of vertex-colored graphs.
//!
//! The oracle contract: given out-adjacency lists and a color encoding (see
//! [`ColoredGraph::color_encoding`](super::ColoredGraph::color_encoding)),
//! return `relabeling` where `relabeling[i]` is the node placed at canonical
//! position `i`. Positions never mix color classes, and isomorphic colored
//! inputs relabel to identical structures.

use crate::IndexError;
use std::sync::atomic::{AtomicBool, Ordering};

/// A canonical labeling oracle.
pub trait CanonicalLabeler: Send + Sync {
    /// Compute a canonical relabeling.
    ///
    /// Implementations should poll `cancel` and return
    /// `IndexError::OracleCancelled` once it is set.
    fn canonical_labeling(
        &self,
        adjacency: &[Vec<u32>],
        colors: &[i32],
        cancel: &AtomicBool,
    ) -> Result<Vec<u32>, IndexError>;
}

/// Individualization-refinement labeler.
///
/// Refines the color partition by neighbour-cell signatures until stable,
/// then individualizes every vertex of the first non-singleton cell in turn.
/// Of all discrete leaves, the one whose relabeled adjacency is smallest
/// wins. There is no automorphism pruning, so the search is exponential in
/// the number of symmetric vertices.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefinementLabeler;

impl CanonicalLabeler for RefinementLabeler {
    fn canonical_labeling(
        &self,
        adjacency: &[Vec<u32>],
        colors: &[i32],
        cancel: &AtomicBool,
    ) -> Result<Vec<u32>, IndexError> {
        let n = adjacency.len();
        let cells = decode_colors(n, colors)?;

        let mut incoming = vec![Vec::new(); n];
        for (node, row) in adjacency.iter().enumerate() {
            for &neighbour in row {
                let slot = incoming.get_mut(neighbour as usize).ok_or_else(|| {
                    IndexError::OracleFailure(format!(
                        "node {} has out-of-range neighbour {}",
                        node, neighbour
                    ))
                })?;
                slot.push(node as u32);
            }
        }

        let mut search = Search {
            outgoing: adjacency,
            incoming,
            cancel,
            best: None,
        };
        search.descend(cells)?;

        search
            .best
            .map(|(_, relabeling)| relabeling)
            .ok_or_else(|| IndexError::OracleFailure("search produced no leaf".to_string()))
    }
}

/// Split a color encoding into ordered cells, checking it covers every node
/// exactly once.
fn decode_colors(n: usize, colors: &[i32]) -> Result<Vec<Vec<u32>>, IndexError> {
    let mut cells = Vec::new();
    let mut current = Vec::new();
    let mut seen = vec![false; n];

    for &color in colors {
        let node = color.unsigned_abs().wrapping_sub(1) as usize;
        match seen.get_mut(node) {
            Some(flag) if !*flag => *flag = true,
            _ => {
                return Err(IndexError::OracleFailure(format!(
                    "color entry {} is out of range or repeated",
                    color
                )));
            }
        }
        current.push(node as u32);
        if color < 0 {
            cells.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        return Err(IndexError::OracleFailure(
            "color encoding ends inside a class".to_string(),
        ));
    }
    if seen.iter().any(|flag| !flag) {
        return Err(IndexError::OracleFailure(
            "color encoding leaves nodes uncolored".to_string(),
        ));
    }
    Ok(cells)
}

/// Out- and in-neighbour cells, each sorted.
type Signature = (Vec<usize>, Vec<usize>);

/// Relabeled adjacency of a leaf, compared lexicographically.
type Certificate = Vec<Vec<u32>>;

struct Search<'a> {
    outgoing: &'a [Vec<u32>],
    incoming: Vec<Vec<u32>>,
    cancel: &'a AtomicBool,
    best: Option<(Certificate, Vec<u32>)>,
}

impl Search<'_> {
    fn descend(&mut self, cells: Vec<Vec<u32>>) -> Result<(), IndexError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(IndexError::OracleCancelled);
        }

        let cells = self.refine(cells);
        let Some(target) = cells.iter().position(|cell| cell.len() > 1) else {
            let relabeling: Vec<u32> = cells.iter().map(|cell| cell[0]).collect();
            let certificate = self.certificate(&relabeling);
            if self
                .best
                .as_ref()
                .is_none_or(|(best, _)| certificate < *best)
            {
                self.best = Some((certificate, relabeling));
            }
            return Ok(());
        };

        for &vertex in &cells[target] {
            let rest: Vec<u32> = cells[target]
                .iter()
                .copied()
                .filter(|&u| u != vertex)
                .collect();
            let mut child = cells.clone();
            child[target] = vec![vertex];
            child.insert(target + 1, rest);
            self.descend(child)?;
        }
        Ok(())
    }

    /// Split cells until every vertex in a cell has the same signature.
    /// Sub-cells take the place of their parent in ascending signature order.
    fn refine(&self, mut cells: Vec<Vec<u32>>) -> Vec<Vec<u32>> {
        let n = self.outgoing.len();
        loop {
            let mut cell_of = vec![0usize; n];
            for (index, cell) in cells.iter().enumerate() {
                for &v in cell {
                    cell_of[v as usize] = index;
                }
            }

            let mut next = Vec::with_capacity(cells.len());
            let mut split = false;
            for cell in &cells {
                if cell.len() == 1 {
                    next.push(cell.clone());
                    continue;
                }

                let mut keyed: Vec<(Signature, u32)> = cell
                    .iter()
                    .map(|&v| (self.signature(v, &cell_of), v))
                    .collect();
                keyed.sort();

                let before = next.len();
                for run in keyed.chunk_by(|a, b| a.0 == b.0) {
                    next.push(run.iter().map(|(_, v)| *v).collect());
                }
                split |= next.len() - before > 1;
            }

            cells = next;
            if !split {
                return cells;
            }
        }
    }

    fn signature(&self, v: u32, cell_of: &[usize]) -> Signature {
        let cells_of = |nodes: &[u32]| {
            let mut cells: Vec<usize> = nodes.iter().map(|&u| cell_of[u as usize]).collect();
            cells.sort_unstable();
            cells
        };
        (
            cells_of(&self.outgoing[v as usize]),
            cells_of(&self.incoming[v as usize]),
        )
    }

    fn certificate(&self, relabeling: &[u32]) -> Certificate {
        let mut inverse = vec![0u32; relabeling.len()];
        for (position, &node) in relabeling.iter().enumerate() {
            inverse[node as usize] = position as u32;
        }
        relabeling
            .iter()
            .map(|&node| {
                let mut row: Vec<u32> = self.outgoing[node as usize]
                    .iter()
                    .map(|&u| inverse[u as usize])
                    .collect();
                row.sort_unstable();
                row
            })
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn label(adjacency: &[Vec<u32>], colors: &[i32]) -> Vec<u32> {
        RefinementLabeler
            .canonical_labeling(adjacency, colors, &AtomicBool::new(false))
            .expect("labeling")
    }

    fn relabeled(adjacency: &[Vec<u32>], relabeling: &[u32]) -> Vec<Vec<u32>> {
        let mut inverse = vec![0u32; relabeling.len()];
        for (i, &node) in relabeling.iter().enumerate() {
            inverse[node as usize] = i as u32;
        }
        relabeling
            .iter()
            .map(|&node| {
                let mut row: Vec<u32> = adjacency[node as usize]
                    .iter()
                    .map(|&u| inverse[u as usize])
                    .collect();
                row.sort_unstable();
                row
            })
            .collect()
    }

    #[test]
    fn result_is_a_color_respecting_permutation() {
        // 0 -> 2 -> 1, 0 -> 3 -> 1 with 2 and 3 sharing a color
        let adjacency = vec![vec![2, 3], vec![], vec![1], vec![1]];
        let colors = [-1, -2, 3, -4];
        let relabeling = label(&adjacency, &colors);

        assert_eq!(relabeling[0], 0);
        assert_eq!(relabeling[1], 1);
        let mut tail = relabeling[2..].to_vec();
        tail.sort_unstable();
        assert_eq!(tail, vec![2, 3]);
    }

    #[test]
    fn isomorphic_inputs_give_identical_structure() {
        // a path s -> a -> b -> t where a and b share a color, numbered two ways
        let first = vec![vec![2], vec![], vec![3], vec![1]];
        let second = vec![vec![3], vec![], vec![1], vec![2]];
        let colors = [-1, -2, 3, -4];

        let a = relabeled(&first, &label(&first, &colors));
        let b = relabeled(&second, &label(&second, &colors));
        assert_eq!(a, b);
    }

    #[test]
    fn non_isomorphic_inputs_differ() {
        let chain = vec![vec![2], vec![], vec![3], vec![1]];
        let fork = vec![vec![2, 3], vec![], vec![1], vec![1]];
        let colors = [-1, -2, 3, -4];

        let a = relabeled(&chain, &label(&chain, &colors));
        let b = relabeled(&fork, &label(&fork, &colors));
        assert_ne!(a, b);
    }

    #[test]
    fn symmetric_cycle_is_handled() {
        // uncolored directed 4-cycle: every rotation is an automorphism
        let adjacency = vec![vec![1], vec![2], vec![3], vec![0]];
        let relabeling = label(&adjacency, &[1, 2, 3, -4]);
        let mut sorted = relabeling.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn malformed_colors_rejected() {
        let adjacency = vec![vec![1], vec![]];
        let cancel = AtomicBool::new(false);
        for colors in [&[1, 2][..], &[-1][..], &[-1, -1][..], &[-1, -3][..], &[0, -2][..]] {
            assert!(matches!(
                RefinementLabeler.canonical_labeling(&adjacency, colors, &cancel),
                Err(IndexError::OracleFailure(_))
            ));
        }
    }

    #[test]
    fn cancelled_search_stops() {
        let adjacency = vec![vec![1], vec![0]];
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            RefinementLabeler.canonical_labeling(&adjacency, &[1, -2], &cancel),
            Err(IndexError::OracleCancelled)
        ));
    }
}
