//! # Bisimulation Partitioner
//!
//! Layered k-path-bisimulation over vertex pairs.
//!
//! Layer `i` holds one [`Segment`] per vertex pair connected by a walk of
//! length `i + 1`. Segments are sorted so that equivalent ones are adjacent
//! and every run of equivalent segments shares one [`SegmentId`]. Ids grow
//! strictly across layers.
//!
//! - Layer 0 groups on `(label set, is loop)`.
//! - Layer `i > 0` joins every pair of segments from layers `k1` and `k2`
//!   with `k1 + k2 = i - 1`, then groups on
//!   `(provenance ids, ancestor id, is loop)`.
//!
//! Segments reference each other through [`SegmentRef`] indices into the
//! layer arena, never through pointers.

use crate::graph::LabeledGraph;
use crate::progress::ProgressListener;
use crate::{IndexError, LabelSequence, Pair, SegmentId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// REFERENCES
// =============================================================================

/// Position of a segment in the layer arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentRef {
    /// Zero-based layer.
    pub layer: usize,
    /// Index inside the sorted layer.
    pub index: usize,
}

impl SegmentRef {
    /// Create a new reference.
    #[must_use]
    pub const fn new(layer: usize, index: usize) -> Self {
        Self { layer, index }
    }
}

/// Two segments whose concatenation produced a longer segment.
///
/// Equality and order only look at the two segment ids, so two joins that
/// hit the same equivalence runs collapse into one record.
#[derive(Debug, Clone, Copy)]
pub struct PathPair {
    first: SegmentRef,
    second: SegmentRef,
    first_id: SegmentId,
    second_id: SegmentId,
}

impl PathPair {
    /// The prefix segment.
    #[must_use]
    pub fn first(&self) -> SegmentRef {
        self.first
    }

    /// The suffix segment.
    #[must_use]
    pub fn second(&self) -> SegmentRef {
        self.second
    }

    /// Ids of the prefix and suffix runs.
    #[must_use]
    pub fn ids(&self) -> (SegmentId, SegmentId) {
        (self.first_id, self.second_id)
    }
}

impl PartialEq for PathPair {
    fn eq(&self, other: &Self) -> bool {
        self.ids() == other.ids()
    }
}

impl Eq for PathPair {}

impl Ord for PathPair {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ids().cmp(&other.ids())
    }
}

impl PartialOrd for PathPair {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// SEGMENTS
// =============================================================================

/// Evidence gathered for one vertex pair at one layer.
#[derive(Debug, Clone)]
pub struct Segment {
    pair: Pair,
    labels: BTreeSet<LabelSequence>,
    provenance: BTreeSet<PathPair>,
    ancestor: Option<SegmentRef>,
    ancestor_id: Option<SegmentId>,
    id: SegmentId,
}

impl Segment {
    fn new(pair: Pair, ancestor: Option<(SegmentRef, SegmentId)>) -> Self {
        Self {
            pair,
            labels: BTreeSet::new(),
            provenance: BTreeSet::new(),
            ancestor: ancestor.map(|(r, _)| r),
            ancestor_id: ancestor.map(|(_, id)| id),
            id: SegmentId::default(),
        }
    }

    /// The vertex pair.
    #[must_use]
    pub fn pair(&self) -> Pair {
        self.pair
    }

    /// Label sequences of walks between the pair, all of this layer's length.
    #[must_use]
    pub fn labels(&self) -> &BTreeSet<LabelSequence> {
        &self.labels
    }

    /// How this segment was built; empty at layer 0.
    #[must_use]
    pub fn provenance(&self) -> &BTreeSet<PathPair> {
        &self.provenance
    }

    /// Latest segment of an earlier layer with the same pair.
    ///
    /// This is not always layer `i - 1`: a pair with no walk of that length
    /// links back to the last layer that had one.
    #[must_use]
    pub fn ancestor(&self) -> Option<SegmentRef> {
        self.ancestor
    }

    /// Run id of the ancestor.
    #[must_use]
    pub fn ancestor_id(&self) -> Option<SegmentId> {
        self.ancestor_id
    }

    /// Run id shared with every equivalent segment of this layer.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// True if source and target coincide.
    #[must_use]
    pub fn is_loop(&self) -> bool {
        self.pair.is_loop()
    }

    fn first_layer_order(a: &Self, b: &Self) -> Ordering {
        a.labels
            .iter()
            .cmp(b.labels.iter())
            .then_with(|| a.is_loop().cmp(&b.is_loop()))
            .then_with(|| a.pair.cmp(&b.pair))
    }

    fn same_first_layer_key(a: &Self, b: &Self) -> bool {
        a.labels == b.labels && a.is_loop() == b.is_loop()
    }

    fn joined_layer_order(a: &Self, b: &Self) -> Ordering {
        a.provenance
            .iter()
            .cmp(b.provenance.iter())
            .then_with(|| a.ancestor_id.cmp(&b.ancestor_id))
            .then_with(|| a.is_loop().cmp(&b.is_loop()))
            .then_with(|| a.pair.cmp(&b.pair))
    }

    fn same_joined_layer_key(a: &Self, b: &Self) -> bool {
        a.provenance == b.provenance && a.ancestor_id == b.ancestor_id && a.is_loop() == b.is_loop()
    }
}

// =============================================================================
// PARTITION
// =============================================================================

/// All `k` layers of a bisimulation partition.
#[derive(Debug, Clone)]
pub struct Partition {
    layers: Vec<Vec<Segment>>,
}

impl Partition {
    /// Partition every walk of length `1..=k` in `graph`.
    ///
    /// Returns `IndexError::InvalidArgument` if `k` is zero.
    pub fn build(
        graph: &LabeledGraph,
        k: usize,
        progress: &dyn ProgressListener,
    ) -> Result<Self, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }

        let mut layers: Vec<Vec<Segment>> = Vec::with_capacity(k);
        let mut history: BTreeMap<Pair, SegmentRef> = BTreeMap::new();
        let mut next_id = 1u32;

        progress.partition_start(1);
        let mut working: BTreeMap<Pair, Segment> = BTreeMap::new();
        for edge in graph.edges() {
            let label = edge.forward();
            working
                .entry(Pair::new(edge.src, edge.trg))
                .or_insert_with_key(|pair| Segment::new(*pair, None))
                .labels
                .insert(LabelSequence::single(label));
            working
                .entry(Pair::new(edge.trg, edge.src))
                .or_insert_with_key(|pair| Segment::new(*pair, None))
                .labels
                .insert(LabelSequence::single(label.inverse()));
        }
        let layer = Self::assign_ids(
            working.into_values().collect(),
            &mut next_id,
            Segment::first_layer_order,
            Segment::same_first_layer_key,
        );
        Self::record_history(&mut history, 0, &layer);
        layers.push(layer);
        progress.partition_end(1);

        for i in 1..k {
            progress.partition_start(i + 1);
            next_id = next_id.checked_add(1).ok_or_else(Self::id_overflow)?;

            let mut working: BTreeMap<Pair, Segment> = BTreeMap::new();
            for k1 in (0..i).rev() {
                let k2 = i - 1 - k1;
                progress.combination_start(k1 + 1, k2 + 1);

                let by_source = Self::index_by_source(&layers[k2]);
                for (seg_index, seg) in layers[k1].iter().enumerate() {
                    let Some(ends) = by_source.get(&seg.pair.trg) else {
                        continue;
                    };
                    for &end_index in ends {
                        let end = &layers[k2][end_index];
                        let path = working
                            .entry(Pair::new(seg.pair.src, end.pair.trg))
                            .or_insert_with_key(|pair| {
                                let ancestor = history.get(pair).map(|&r| {
                                    (r, layers[r.layer][r.index].id)
                                });
                                Segment::new(*pair, ancestor)
                            });

                        path.provenance.insert(PathPair {
                            first: SegmentRef::new(k1, seg_index),
                            second: SegmentRef::new(k2, end_index),
                            first_id: seg.id,
                            second_id: end.id,
                        });

                        if k2 == 0 {
                            for prefix in &seg.labels {
                                for last in &end.labels {
                                    path.labels.insert(LabelSequence::concat(prefix, last));
                                }
                            }
                        }
                    }
                }

                progress.combination_end(k1 + 1, k2 + 1);
            }

            let layer = Self::assign_ids(
                working.into_values().collect(),
                &mut next_id,
                Segment::joined_layer_order,
                Segment::same_joined_layer_key,
            );
            Self::record_history(&mut history, i, &layer);
            layers.push(layer);
            progress.partition_end(i + 1);
        }

        Ok(Self { layers })
    }

    /// Number of layers.
    #[must_use]
    pub fn k(&self) -> usize {
        self.layers.len()
    }

    /// Sorted segments of a zero-based layer; empty if out of range.
    #[must_use]
    pub fn layer(&self, layer: usize) -> &[Segment] {
        self.layers.get(layer).map_or(&[], Vec::as_slice)
    }

    /// Look up a segment.
    #[must_use]
    pub fn segment(&self, at: SegmentRef) -> Option<&Segment> {
        self.layers.get(at.layer)?.get(at.index)
    }

    /// Runs of equivalent segments in a layer, in sorted order.
    pub fn runs(&self, layer: usize) -> impl Iterator<Item = &[Segment]> {
        self.layer(layer).chunk_by(|a, b| a.id == b.id)
    }

    /// Sort a layer and hand out run ids, continuing from `next_id`.
    ///
    /// On return `next_id` holds the id of the last run.
    fn assign_ids(
        mut segments: Vec<Segment>,
        next_id: &mut u32,
        order: fn(&Segment, &Segment) -> Ordering,
        same_key: fn(&Segment, &Segment) -> bool,
    ) -> Vec<Segment> {
        segments.sort_by(order);

        let mut id = *next_id;
        for index in 0..segments.len() {
            if index > 0 && !same_key(&segments[index - 1], &segments[index]) {
                id = id.saturating_add(1);
            }
            segments[index].id = SegmentId(id);
        }
        *next_id = id;
        segments
    }

    fn record_history(history: &mut BTreeMap<Pair, SegmentRef>, layer: usize, segments: &[Segment]) {
        for (index, segment) in segments.iter().enumerate() {
            history.insert(segment.pair, SegmentRef::new(layer, index));
        }
    }

    fn index_by_source(segments: &[Segment]) -> BTreeMap<u32, Vec<usize>> {
        let mut by_source: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (index, segment) in segments.iter().enumerate() {
            by_source.entry(segment.pair.src).or_default().push(index);
        }
        by_source
    }

    fn id_overflow() -> IndexError {
        IndexError::InvalidState("segment id space exhausted".to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::Label;
    use std::cell::RefCell;

    /// Two diamonds sharing vertex 3: 0 -0-> 1 -0-> 3, 0 -1-> 2 -1-> 3,
    /// 3 -2-> 4 -2-> 6, 3 -3-> 5 -3-> 6.
    fn diamonds() -> LabeledGraph {
        let mut graph = LabeledGraph::new(7, 4);
        for (s, t, l) in [
            (0, 1, 0),
            (0, 2, 1),
            (1, 3, 0),
            (2, 3, 1),
            (3, 4, 2),
            (3, 5, 3),
            (4, 6, 2),
            (5, 6, 3),
        ] {
            graph.add_edge(s, t, l).expect("edge");
        }
        graph
    }

    fn shown(segment: &Segment) -> Vec<String> {
        segment.labels().iter().map(|s| s.to_string()).collect()
    }

    fn find(partition: &Partition, layer: usize, pair: Pair) -> &Segment {
        partition
            .layer(layer)
            .iter()
            .find(|s| s.pair() == pair)
            .expect("segment")
    }

    #[test]
    fn zero_depth_rejected() {
        let result = Partition::build(&diamonds(), 0, &NoProgress);
        assert!(matches!(result, Err(IndexError::InvalidArgument(_))));
    }

    #[test]
    fn first_layer_holds_edges_and_inverses() {
        let partition = Partition::build(&diamonds(), 1, &NoProgress).expect("partition");
        assert_eq!(partition.k(), 1);
        assert_eq!(partition.layer(0).len(), 16);

        let forward = find(&partition, 0, Pair::new(0, 1));
        assert_eq!(shown(forward), vec!["0"]);
        let backward = find(&partition, 0, Pair::new(1, 0));
        assert_eq!(shown(backward), vec!["0⁻"]);

        // one run per signed label
        assert_eq!(partition.runs(0).count(), 8);
        let first = partition.layer(0)[0].id();
        assert_eq!(first, SegmentId(1));
    }

    #[test]
    fn runs_share_labels_and_ids() {
        let partition = Partition::build(&diamonds(), 1, &NoProgress).expect("partition");
        let a = find(&partition, 0, Pair::new(0, 1));
        let b = find(&partition, 0, Pair::new(1, 3));
        let c = find(&partition, 0, Pair::new(0, 2));
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn second_layer_concatenates_labels() {
        let partition = Partition::build(&diamonds(), 2, &NoProgress).expect("partition");

        assert_eq!(shown(find(&partition, 1, Pair::new(0, 3))), vec!["00", "11"]);
        assert_eq!(
            shown(find(&partition, 1, Pair::new(3, 3))),
            vec!["0⁻0", "1⁻1", "22⁻", "33⁻"]
        );
        for segment in partition.layer(1) {
            assert!(segment.labels().iter().all(|s| s.len() == 2));
            assert!(!segment.provenance().is_empty());
        }
    }

    #[test]
    fn ids_increase_across_layers() {
        let partition = Partition::build(&diamonds(), 3, &NoProgress).expect("partition");
        for layer in 1..partition.k() {
            let previous_max = partition
                .layer(layer - 1)
                .iter()
                .map(Segment::id)
                .max()
                .expect("non-empty");
            assert!(partition.layer(layer).iter().all(|s| s.id() > previous_max));
        }
    }

    #[test]
    fn ancestors_point_to_latest_same_pair() {
        let partition = Partition::build(&diamonds(), 3, &NoProgress).expect("partition");

        // (0,1) exists at layers 0 and 2 but not 1
        let late = find(&partition, 2, Pair::new(0, 1));
        let ancestor = late.ancestor().expect("ancestor");
        assert_eq!(ancestor.layer, 0);
        let earlier = partition.segment(ancestor).expect("segment");
        assert_eq!(earlier.pair(), Pair::new(0, 1));
        assert_eq!(late.ancestor_id(), Some(earlier.id()));

        // (0,3) first appears at layer 1
        assert!(find(&partition, 1, Pair::new(0, 3)).ancestor().is_none());
    }

    #[test]
    fn provenance_collapses_equivalent_joins() {
        let partition = Partition::build(&diamonds(), 2, &NoProgress).expect("partition");
        // (0,0) via 1 and via 2 use different runs, so both survive
        assert_eq!(find(&partition, 1, Pair::new(0, 0)).provenance().len(), 2);
        // (1,1) via 3 and via 0 use different runs too
        assert_eq!(find(&partition, 1, Pair::new(1, 1)).provenance().len(), 2);

        for segment in partition.layer(1) {
            for step in segment.provenance() {
                let first = partition.segment(step.first()).expect("first");
                let second = partition.segment(step.second()).expect("second");
                assert_eq!(first.pair().trg, second.pair().src);
                assert_eq!(step.ids(), (first.id(), second.id()));
            }
        }
    }

    #[test]
    fn empty_graph_gives_empty_layers() {
        let graph = LabeledGraph::new(3, 1);
        let partition = Partition::build(&graph, 3, &NoProgress).expect("partition");
        assert_eq!(partition.k(), 3);
        assert!((0..3).all(|i| partition.layer(i).is_empty()));
        assert_eq!(partition.runs(0).count(), 0);
    }

    #[test]
    fn loops_never_share_runs_with_paths() {
        let mut graph = LabeledGraph::new(2, 1);
        graph.add_edge(0, 0, 0).expect("edge");
        graph.add_edge(0, 1, 0).expect("edge");
        graph.add_edge(1, 0, 0).expect("edge");
        let partition = Partition::build(&graph, 1, &NoProgress).expect("partition");

        let looped = find(&partition, 0, Pair::new(0, 0));
        let plain = find(&partition, 0, Pair::new(0, 1));
        assert_eq!(looped.labels(), plain.labels());
        assert_ne!(looped.id(), plain.id());
        assert!(looped.labels().contains(&LabelSequence::single(Label::forward(0))));
    }

    #[derive(Default)]
    struct Events(RefCell<Vec<String>>);

    impl ProgressListener for Events {
        fn partition_start(&self, k: usize) {
            self.0.borrow_mut().push(format!("p{}", k));
        }

        fn combination_start(&self, k1: usize, k2: usize) {
            self.0.borrow_mut().push(format!("c{}{}", k1, k2));
        }
    }

    #[test]
    fn progress_reports_every_split() {
        let events = Events::default();
        Partition::build(&diamonds(), 3, &events).expect("partition");
        assert_eq!(
            *events.0.borrow(),
            vec!["p1", "p2", "c11", "p3", "c21", "c12"]
        );
    }
}
