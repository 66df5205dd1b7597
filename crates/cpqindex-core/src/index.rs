//! # Index Builder
//!
//! Turns the layers of a [`Partition`] into final blocks and, optionally,
//! their canonical CPQ cores.
//!
//! Layers are consumed in increasing depth. Blocks of a layer that is not
//! the last stay "open" under each of their pairs; a later run touching such
//! a pair inherits the open block (its label sequences and cores). Blocks of
//! the last layer are final, and so is every open block whose pairs never
//! reappear.
//!
//! Core computation is the expensive part: closure intersects subsets of a
//! block's cores, skipping any subset with two members that collapse onto
//! each other or with two cores inherited from an earlier layer. It is off
//! unless [`IndexOptions::compute_cores`] is set.

use crate::canon::{CanonEngine, CoreHash};
use crate::cpq::{Cpq, QueryGraph};
use crate::graph::LabeledGraph;
use crate::partition::{Partition, Segment};
use crate::primitives::{
    DEFAULT_K, DEFAULT_LABELING_THREADS, LABELING_QUEUE_PER_WORKER, TABLE_MIN_COLUMN,
    TABLE_SEPARATOR,
};
use crate::progress::ProgressListener;
use crate::{IndexError, LabelSequence, Pair, SegmentId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

// =============================================================================
// OPTIONS
// =============================================================================

/// Construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    /// Longest indexed path length; at least 1.
    pub k: usize,
    /// Compute canonical cores for every block.
    pub compute_cores: bool,
    /// Largest number of cores intersected at once during closure.
    /// `None` intersects every subset.
    pub max_intersections: Option<usize>,
    /// Labeling oracle worker threads.
    pub threads: usize,
    /// Bound on every wait for the labeling oracle.
    pub oracle_timeout: Option<Duration>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

impl IndexOptions {
    /// Options for depth `k` without cores.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            compute_cores: false,
            max_intersections: None,
            threads: DEFAULT_LABELING_THREADS,
            oracle_timeout: None,
        }
    }

    /// Enable or disable core computation.
    #[must_use]
    pub fn with_cores(mut self, compute_cores: bool) -> Self {
        self.compute_cores = compute_cores;
        self
    }

    /// Limit closure intersections to `max` cores.
    #[must_use]
    pub fn with_max_intersections(mut self, max: Option<usize>) -> Self {
        self.max_intersections = max;
        self
    }

    /// Number of labeling threads.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Bound every oracle wait.
    #[must_use]
    pub fn with_oracle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Check every parameter is in range.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.k == 0 {
            return Err(IndexError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }
        if self.threads == 0 {
            return Err(IndexError::InvalidArgument(
                "at least one labeling thread is required".to_string(),
            ));
        }
        if let Some(max) = self.max_intersections
            && max < 2
        {
            return Err(IndexError::InvalidArgument(format!(
                "intersection limit must be at least 2, got {}",
                max
            )));
        }
        Ok(())
    }
}

// =============================================================================
// CORES
// =============================================================================

/// A query describing a block, with its canonical hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Core {
    cpq: Cpq,
    hash: CoreHash,
}

impl Core {
    /// The query as built (not retracted).
    #[must_use]
    pub fn cpq(&self) -> &Cpq {
        &self.cpq
    }

    /// Canonical hash of the query's core.
    #[must_use]
    pub fn hash(&self) -> &CoreHash {
        &self.hash
    }

    /// Base64 of the canonical hash.
    #[must_use]
    pub fn to_base64(&self) -> String {
        self.hash.to_base64()
    }
}

impl fmt::Display for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cpq)
    }
}

/// Cores in insertion order, de-duplicated by canonical hash.
#[derive(Debug, Default)]
struct CoreSet {
    cores: Vec<Core>,
    hashes: BTreeSet<CoreHash>,
}

impl CoreSet {
    fn insert(&mut self, core: Core) -> bool {
        if self.hashes.contains(&core.hash) {
            return false;
        }
        self.hashes.insert(core.hash.clone());
        self.cores.push(core);
        true
    }

    /// Canonicalize `cpqs` in batches and keep the new ones.
    fn absorb<I>(&mut self, engine: &CanonEngine, cpqs: I, is_core: bool) -> Result<(), IndexError>
    where
        I: IntoIterator<Item = Cpq>,
    {
        let batch = engine
            .pool()
            .threads()
            .saturating_mul(LABELING_QUEUE_PER_WORKER)
            .max(1);
        let mut cpqs = cpqs.into_iter();
        loop {
            let chunk: Vec<Cpq> = cpqs.by_ref().take(batch).collect();
            if chunk.is_empty() {
                return Ok(());
            }
            let forms = engine.canonicalize_all(&chunk, is_core)?;
            for (cpq, form) in chunk.into_iter().zip(forms) {
                self.insert(Core {
                    cpq,
                    hash: form.into_hash(),
                });
            }
        }
    }

    /// Like `absorb`, for queries whose core graph is already known.
    fn absorb_retracted<I>(&mut self, engine: &CanonEngine, items: I) -> Result<(), IndexError>
    where
        I: IntoIterator<Item = (Cpq, QueryGraph)>,
    {
        let batch = engine
            .pool()
            .threads()
            .saturating_mul(LABELING_QUEUE_PER_WORKER)
            .max(1);
        let mut items = items.into_iter();
        loop {
            let (cpqs, cores): (Vec<Cpq>, Vec<QueryGraph>) = items.by_ref().take(batch).unzip();
            if cpqs.is_empty() {
                return Ok(());
            }
            let forms = engine.canonicalize_cores(&cores)?;
            for (cpq, form) in cpqs.into_iter().zip(forms) {
                self.insert(Core {
                    cpq,
                    hash: form.into_hash(),
                });
            }
        }
    }
}

/// Index subsets of `0..n` with sizes `3..=max_size` in depth-first order.
///
/// No subset holds two members that conflict, and at most one member below
/// `restricted`: those cores came from an earlier layer and are already
/// closed under intersection.
struct Subsets<'a> {
    n: usize,
    restricted: usize,
    max_size: usize,
    conflicts: &'a [BTreeSet<usize>],
    chosen: Vec<usize>,
    next: usize,
}

impl<'a> Subsets<'a> {
    /// `conflicts[i]` lists the indices below `i` that `i` may not join.
    fn new(
        n: usize,
        restricted: usize,
        max_size: usize,
        conflicts: &'a [BTreeSet<usize>],
    ) -> Self {
        Self {
            n,
            restricted,
            max_size: max_size.min(n),
            conflicts,
            chosen: Vec::new(),
            next: 0,
        }
    }

    fn fits(&self, candidate: usize) -> bool {
        self.conflicts
            .get(candidate)
            .is_none_or(|conflicts| self.chosen.iter().all(|c| !conflicts.contains(c)))
    }
}

impl Iterator for Subsets<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        loop {
            if self.chosen.len() < self.max_size && self.next < self.n {
                let candidate = self.next;
                self.next += 1;
                if self.fits(candidate) {
                    self.chosen.push(candidate);
                    self.next = if candidate < self.restricted {
                        self.restricted
                    } else {
                        candidate + 1
                    };
                    if self.chosen.len() >= 3 {
                        return Some(self.chosen.clone());
                    }
                }
                continue;
            }
            let last = self.chosen.pop()?;
            self.next = last + 1;
        }
    }
}

/// Retract a query and report whether it already was a core.
fn retract(cpq: &Cpq) -> (QueryGraph, bool) {
    let graph = cpq.to_query_graph();
    let core = graph.core();
    let was_core = core.vertex_count() == graph.vertex_count();
    (core, was_core)
}

/// Pairs of unrestricted cores where one maps into the other. Their
/// intersection collapses onto the more specific one.
fn homomorphic_conflicts(graphs: &[QueryGraph], restricted: usize) -> Vec<BTreeSet<usize>> {
    (0..graphs.len())
        .map(|i| {
            (restricted..i)
                .filter(|&j| graphs[i].maps_into(&graphs[j]) || graphs[j].maps_into(&graphs[i]))
                .collect()
        })
        .collect()
}

// =============================================================================
// BLOCKS
// =============================================================================

/// One equivalence class of vertex pairs.
#[derive(Debug, Clone)]
pub struct Block {
    id: SegmentId,
    k: usize,
    pairs: Vec<Pair>,
    labels: BTreeSet<LabelSequence>,
    cores: Vec<Core>,
    core_hashes: BTreeSet<CoreHash>,
}

impl Block {
    /// Id of the segment run this block was built from.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// 1-based layer the block was built at.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Member pairs.
    #[must_use]
    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// Label sequences of this block and every block it inherited from.
    #[must_use]
    pub fn labels(&self) -> &BTreeSet<LabelSequence> {
        &self.labels
    }

    /// Cores in discovery order; empty unless cores were computed.
    #[must_use]
    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    /// Canonical hashes of [`Block::cores`].
    #[must_use]
    pub fn core_hashes(&self) -> &BTreeSet<CoreHash> {
        &self.core_hashes
    }

    /// True if every pair is a loop.
    #[must_use]
    pub fn is_loop(&self) -> bool {
        self.pairs.first().is_some_and(Pair::is_loop)
    }
}

/// Cross-block references of an arena block, by arena index.
#[derive(Debug, Default)]
struct BlockLinks {
    inherited: BTreeSet<usize>,
    provenance: BTreeSet<(usize, usize)>,
}

// =============================================================================
// BUILDER
// =============================================================================

struct Builder<'a> {
    partition: &'a Partition,
    options: &'a IndexOptions,
    progress: &'a dyn ProgressListener,
    engine: Option<&'a CanonEngine>,
    arena: Vec<Block>,
    links: Vec<BlockLinks>,
    /// Arena index of the block built from each segment, per layer.
    segment_blocks: Vec<Vec<usize>>,
    open: BTreeMap<Pair, usize>,
    finals: Vec<usize>,
}

impl Builder<'_> {
    fn run(mut self) -> Result<Vec<Block>, IndexError> {
        let partition = self.partition;
        let last = partition.k() - 1;

        for layer in 0..partition.k() {
            self.progress.blocks_start(layer + 1);
            let first_block = self.arena.len();
            let mut owners = Vec::with_capacity(partition.layer(layer).len());

            for run in partition.runs(layer) {
                let index = self.add_block(layer, run, layer == last)?;
                owners.extend(std::iter::repeat_n(index, run.len()));
            }
            self.segment_blocks.push(owners);
            self.progress.blocks_end(layer + 1);

            if self.engine.is_some() {
                self.progress.cores_start(layer + 1);
                let total = self.arena.len() - first_block;
                for (done, index) in (first_block..self.arena.len()).enumerate() {
                    self.compute_cores(index)?;
                    self.progress.cores_blocks_done(done + 1, total);
                }
                self.progress.cores_end(layer + 1);
            }
        }

        Ok(self.collect())
    }

    fn add_block(&mut self, layer: usize, run: &[Segment], last: bool) -> Result<usize, IndexError> {
        let representative = run.first().ok_or_else(|| {
            IndexError::InvalidState(format!("empty segment run at layer {}", layer + 1))
        })?;
        let index = self.arena.len();

        let mut links = BlockLinks::default();
        for segment in run {
            if let Some(open) = self.open.remove(&segment.pair()) {
                links.inherited.insert(open);
            }
        }
        for step in representative.provenance() {
            let first = self.owner(step.first().layer, step.first().index)?;
            let second = self.owner(step.second().layer, step.second().index)?;
            links.provenance.insert((first, second));
        }

        let mut labels = representative.labels().clone();
        for &inherited in &links.inherited {
            labels.extend(self.arena[inherited].labels.iter().cloned());
        }

        let pairs: Vec<Pair> = run.iter().map(Segment::pair).collect();
        if last {
            self.finals.push(index);
        } else {
            for &pair in &pairs {
                self.open.insert(pair, index);
            }
        }

        self.arena.push(Block {
            id: representative.id(),
            k: layer + 1,
            pairs,
            labels,
            cores: Vec::new(),
            core_hashes: BTreeSet::new(),
        });
        self.links.push(links);
        Ok(index)
    }

    fn owner(&self, layer: usize, index: usize) -> Result<usize, IndexError> {
        self.segment_blocks
            .get(layer)
            .and_then(|owners| owners.get(index))
            .copied()
            .ok_or_else(|| {
                IndexError::InvalidState(format!(
                    "segment {} of layer {} has no block",
                    index,
                    layer + 1
                ))
            })
    }

    /// Fill in the cores of one arena block. Nothing is stored on failure.
    fn compute_cores(&mut self, index: usize) -> Result<(), IndexError> {
        let Some(engine) = self.engine else {
            return Ok(());
        };
        let block = &self.arena[index];
        let links = &self.links[index];
        let mut set = CoreSet::default();
        let mut inherited_count = 0;

        if links.provenance.is_empty() {
            set.absorb(engine, block.labels.iter().map(Cpq::path), true)?;
        } else {
            for &inherited in &links.inherited {
                for core in &self.arena[inherited].cores {
                    set.insert(core.clone());
                }
            }
            inherited_count = set.cores.len();
            let arena = &self.arena;
            let joins = links.provenance.iter().flat_map(move |&(first, second)| {
                arena[first].cores.iter().flat_map(move |prefix| {
                    arena[second]
                        .cores
                        .iter()
                        .map(move |suffix| Cpq::concat(prefix.cpq.clone(), suffix.cpq.clone()))
                })
            });
            set.absorb(engine, joins, false)?;
        }

        let end = set.cores.len();
        let limit = self.options.max_intersections.unwrap_or(usize::MAX);
        let base: Vec<Cpq> = set.cores.iter().map(|core| core.cpq.clone()).collect();
        let graphs: Vec<QueryGraph> = base.iter().map(Cpq::to_query_graph).collect();
        let mut conflicts = homomorphic_conflicts(&graphs, inherited_count);

        // pairwise first; a pair that does not stay a core blocks larger subsets
        let mut pairs = Vec::new();
        for i in inherited_count..end {
            for j in 0..i {
                if conflicts[i].contains(&j) {
                    continue;
                }
                let cpq = Cpq::intersect(base[i].clone(), base[j].clone());
                let (core, was_core) = retract(&cpq);
                if !was_core {
                    conflicts[i].insert(j);
                }
                pairs.push((cpq, core));
            }
        }
        set.absorb_retracted(engine, pairs)?;

        if limit >= 3 {
            let larger = Subsets::new(end, inherited_count, limit, &conflicts)
                .filter_map(|subset| Cpq::intersect_all(subset.into_iter().map(|i| base[i].clone())))
                .map(|cpq| {
                    let (core, _) = retract(&cpq);
                    (cpq, core)
                });
            set.absorb_retracted(engine, larger)?;
        }

        // inherited cores were anchored where they came from
        if block.is_loop() {
            let anchored: Vec<Cpq> = set.cores[inherited_count..]
                .iter()
                .map(|core| Cpq::intersect(core.cpq.clone(), Cpq::id()))
                .collect();
            set.absorb(engine, anchored, false)?;
        }

        let CoreSet { cores, hashes } = set;
        let block = &mut self.arena[index];
        block.cores = cores;
        block.core_hashes = hashes;
        Ok(())
    }

    /// Final blocks: the last layer, then every block left open, restricted
    /// to the pairs that never reappeared.
    fn collect(self) -> Vec<Block> {
        let mut leftovers: BTreeMap<usize, BTreeSet<Pair>> = BTreeMap::new();
        for (pair, index) in self.open {
            leftovers.entry(index).or_default().insert(pair);
        }

        let mut arena: Vec<Option<Block>> = self.arena.into_iter().map(Some).collect();
        let mut blocks = Vec::with_capacity(self.finals.len() + leftovers.len());
        for index in self.finals {
            if let Some(block) = arena.get_mut(index).and_then(Option::take) {
                blocks.push(block);
            }
        }
        for (index, pairs) in leftovers {
            if let Some(mut block) = arena.get_mut(index).and_then(Option::take) {
                block.pairs.retain(|pair| pairs.contains(pair));
                blocks.push(block);
            }
        }
        blocks
    }
}

// =============================================================================
// INDEX
// =============================================================================

/// A complete k-path-bisimulation index.
#[derive(Debug, Clone)]
pub struct Index {
    k: usize,
    blocks: Vec<Block>,
    has_cores: bool,
    core_to_block: BTreeMap<CoreHash, Vec<usize>>,
}

impl Index {
    /// Partition `graph` and build its blocks.
    ///
    /// Cores, when requested, use the built-in labeler on
    /// `options.threads` workers.
    pub fn build(
        graph: &LabeledGraph,
        options: &IndexOptions,
        progress: &dyn ProgressListener,
    ) -> Result<Self, IndexError> {
        options.validate()?;
        let partition = Partition::build(graph, options.k, progress)?;
        Self::from_partition(&partition, options, progress)
    }

    /// Like [`Index::build`], canonicalizing cores through `engine`.
    ///
    /// `engine` is only used if `options.compute_cores` is set; its thread
    /// count and timeout replace `options.threads` and
    /// `options.oracle_timeout`. A labeling failure aborts the build.
    pub fn build_with_engine(
        graph: &LabeledGraph,
        options: &IndexOptions,
        engine: &CanonEngine,
        progress: &dyn ProgressListener,
    ) -> Result<Self, IndexError> {
        options.validate()?;
        let partition = Partition::build(graph, options.k, progress)?;
        Self::assemble(&partition, options, Some(engine), progress)
    }

    /// Build blocks from an existing partition; `options.k` is ignored in
    /// favour of the partition's depth.
    pub fn from_partition(
        partition: &Partition,
        options: &IndexOptions,
        progress: &dyn ProgressListener,
    ) -> Result<Self, IndexError> {
        options.validate()?;
        if options.compute_cores {
            let engine = CanonEngine::with_threads(options.threads, options.oracle_timeout)?;
            Self::assemble(partition, options, Some(&engine), progress)
        } else {
            Self::assemble(partition, options, None, progress)
        }
    }

    fn assemble(
        partition: &Partition,
        options: &IndexOptions,
        engine: Option<&CanonEngine>,
        progress: &dyn ProgressListener,
    ) -> Result<Self, IndexError> {
        if partition.k() == 0 {
            return Err(IndexError::InvalidArgument(
                "partition has no layers".to_string(),
            ));
        }
        let engine = engine.filter(|_| options.compute_cores);

        let builder = Builder {
            partition,
            options,
            progress,
            engine,
            arena: Vec::new(),
            links: Vec::new(),
            segment_blocks: Vec::with_capacity(partition.k()),
            open: BTreeMap::new(),
            finals: Vec::new(),
        };
        let blocks = builder.run()?;

        let mut index = Self {
            k: partition.k(),
            blocks,
            has_cores: options.compute_cores,
            core_to_block: BTreeMap::new(),
        };
        if index.has_cores {
            progress.map_start();
            index.map_cores();
            progress.map_end();
        }
        Ok(index)
    }

    /// Depth of the index.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Final blocks.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// True if cores were computed.
    #[must_use]
    pub fn has_cores(&self) -> bool {
        self.has_cores
    }

    /// Sort every block's pairs and the blocks by their first pair.
    ///
    /// Only presentation changes; membership stays the same.
    pub fn sort(&mut self) {
        for block in &mut self.blocks {
            block.pairs.sort_unstable();
        }
        self.blocks.sort_by_key(|block| block.pairs.first().copied());
        self.map_cores();
    }

    /// Sum of core counts over all blocks.
    #[must_use]
    pub fn total_cores(&self) -> usize {
        self.core_to_block.values().map(Vec::len).sum()
    }

    /// Number of distinct cores.
    #[must_use]
    pub fn unique_cores(&self) -> usize {
        self.core_to_block.len()
    }

    /// Blocks holding the given core.
    pub fn blocks_for_core(&self, hash: &CoreHash) -> impl Iterator<Item = &Block> {
        self.core_to_block
            .get(hash)
            .into_iter()
            .flatten()
            .filter_map(|&index| self.blocks.get(index))
    }

    /// Render the blocks side by side: id, pairs, labels, then cores.
    #[must_use]
    pub fn render_table(&self) -> String {
        let max_pairs = self.blocks.iter().map(|b| b.pairs.len()).max().unwrap_or(0);
        let max_labels = self.blocks.iter().map(|b| b.labels.len()).max().unwrap_or(0);
        let max_cores = self.blocks.iter().map(|b| b.cores.len()).max().unwrap_or(0);
        let label_start = 3 + max_pairs;
        let core_start = label_start + 1 + max_labels;

        let mut rows = vec![String::new(); 4 + max_pairs + max_labels + max_cores];
        let mut width = 0;
        for block in &self.blocks {
            if width > 0 {
                rows.iter_mut().for_each(|row| row.push('|'));
            }

            let mut column = TABLE_MIN_COLUMN;
            rows[0].push_str(&block.id.to_string());
            for (i, pair) in block.pairs.iter().enumerate() {
                put_cell(&mut rows[i + 2], &pair.to_string(), &mut column);
            }
            rows[label_start - 1].push_str(TABLE_SEPARATOR);
            for (i, labels) in block.labels.iter().enumerate() {
                put_cell(&mut rows[label_start + i], &labels.to_string(), &mut column);
            }
            rows[core_start - 1].push_str(TABLE_SEPARATOR);
            for (i, core) in block.cores.iter().enumerate() {
                put_cell(&mut rows[core_start + i], &core.to_string(), &mut column);
            }

            width += column + 2;
            for row in &mut rows {
                let len = row.chars().count();
                let fill = if row.ends_with('-') { '-' } else { ' ' };
                row.extend(std::iter::repeat_n(fill, width.saturating_sub(len)));
            }
        }

        let mut out = String::new();
        for row in rows {
            out.push_str(&row);
            out.push('\n');
        }
        out
    }

    fn map_cores(&mut self) {
        self.core_to_block.clear();
        for (index, block) in self.blocks.iter().enumerate() {
            for hash in &block.core_hashes {
                self.core_to_block.entry(hash.clone()).or_default().push(index);
            }
        }
    }
}

fn put_cell(row: &mut String, text: &str, column: &mut usize) {
    *column = (*column).max(text.chars().count());
    row.push_str(text);
}

// =============================================================================
// TESTS
// =============================================================================
