//! Query graphs and core retraction.

use super::Cpq;
use crate::graph::Edge;
use std::collections::BTreeSet;

// =============================================================================
// QUERY GRAPH
// =============================================================================

/// The graph of a CPQ with distinguished source and target vertices.
///
/// Vertices are `0..vertex_count`. The source is always vertex 0 and the
/// target is vertex 1 unless the query is a loop, in which case both are 0.
/// Inverse labels are stored as forward edges in the opposite direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryGraph {
    vertex_count: u32,
    source: u32,
    target: u32,
    edges: BTreeSet<Edge>,
}

impl QueryGraph {
    /// Build the query graph of an expression.
    #[must_use]
    pub fn from_cpq(cpq: &Cpq) -> Self {
        let mut builder = Builder {
            parent: vec![0, 1],
            edges: Vec::new(),
        };
        builder.visit(cpq, 0, 1);
        builder.finish()
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of (unique) edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Source vertex.
    #[must_use]
    pub fn source(&self) -> u32 {
        self.source
    }

    /// Target vertex.
    #[must_use]
    pub fn target(&self) -> u32 {
        self.target
    }

    /// True when source and target coincide.
    #[must_use]
    pub fn is_loop(&self) -> bool {
        self.source == self.target
    }

    /// Edges in `(src, trg, label)` order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Retract to the core: the smallest subgraph that this graph maps onto
    /// homomorphically with source and target fixed.
    ///
    /// Repeatedly looks for an endomorphism that misses some non-terminal
    /// vertex and replaces the graph with its image, until every
    /// endomorphism is onto.
    #[must_use]
    pub fn core(&self) -> Self {
        let mut current = self.clone();
        while let Some(mapping) = Homomorphism::non_surjective(&current) {
            current = current.image(&mapping);
        }
        current
    }

    /// True if there is a homomorphism from this graph into `other` that maps
    /// source to source and target to target.
    #[must_use]
    pub fn maps_into(&self, other: &Self) -> bool {
        Homomorphism::search(self, other).is_some()
    }

    /// The subgraph formed by the images of all edges under `mapping`,
    /// renumbered so the source stays first.
    fn image(&self, mapping: &[u32]) -> Self {
        let mut used: BTreeSet<u32> = self
            .edges
            .iter()
            .flat_map(|e| [mapping[e.src as usize], mapping[e.trg as usize]])
            .collect();
        used.insert(self.source);
        used.insert(self.target);

        let mut renumber = vec![u32::MAX; self.vertex_count as usize];
        let mut next = 0u32;
        for v in [self.source, self.target].into_iter().chain(used.iter().copied()) {
            if renumber[v as usize] == u32::MAX {
                renumber[v as usize] = next;
                next += 1;
            }
        }

        let edges = self
            .edges
            .iter()
            .map(|e| {
                Edge::new(
                    renumber[mapping[e.src as usize] as usize],
                    renumber[mapping[e.trg as usize] as usize],
                    e.label,
                )
            })
            .collect();

        Self {
            vertex_count: next,
            source: renumber[self.source as usize],
            target: renumber[self.target as usize],
            edges,
        }
    }
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

/// Union-find based builder; identity merges vertices.
struct Builder {
    parent: Vec<u32>,
    edges: Vec<(u32, u32, u32)>,
}

impl Builder {
    fn fresh(&mut self) -> u32 {
        let v = self.parent.len() as u32;
        self.parent.push(v);
        v
    }

    fn find(&mut self, v: u32) -> u32 {
        let mut root = v;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = v;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // keep the smaller root so the source stays representative
            let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[drop as usize] = keep;
        }
    }

    fn visit(&mut self, cpq: &Cpq, s: u32, t: u32) {
        match cpq {
            Cpq::Identity => self.union(s, t),
            Cpq::Label(label) => {
                if label.is_inverse() {
                    self.edges.push((t, s, label.id()));
                } else {
                    self.edges.push((s, t, label.id()));
                }
            }
            Cpq::Concat(left, right) => {
                let mid = self.fresh();
                self.visit(left, s, mid);
                self.visit(right, mid, t);
            }
            Cpq::Intersect(left, right) => {
                self.visit(left, s, t);
                self.visit(right, s, t);
            }
        }
    }

    fn finish(mut self) -> QueryGraph {
        let count = self.parent.len();
        let mut renumber = vec![u32::MAX; count];
        let mut next = 0u32;

        let source = self.find(0);
        let target = self.find(1);
        let mut order = vec![source, target];
        for v in 0..count as u32 {
            order.push(self.find(v));
        }
        for root in order {
            if renumber[root as usize] == u32::MAX {
                renumber[root as usize] = next;
                next += 1;
            }
        }

        let edges: Vec<(u32, u32, u32)> = std::mem::take(&mut self.edges);
        let edges = edges
            .into_iter()
            .map(|(a, b, label)| {
                let a = self.find(a);
                let b = self.find(b);
                Edge::new(renumber[a as usize], renumber[b as usize], label)
            })
            .collect();

        QueryGraph {
            vertex_count: next,
            source: renumber[source as usize],
            target: renumber[target as usize],
            edges,
        }
    }
}

// =============================================================================
// HOMOMORPHISM SEARCH
// =============================================================================

/// Candidate images per vertex of the mapped graph, each sorted ascending.
type Domains = Vec<Vec<u32>>;

/// Search for a label-preserving homomorphism that fixes the source and
/// target.
///
/// Every vertex keeps a domain of possible images. Domains start from the
/// vertices of `into` that carry all of its incoming and outgoing labels and
/// are kept arc-consistent: an image survives only if every edge of the
/// vertex has a matching edge to some surviving image of the other end.
/// Branching picks the smallest open domain and re-propagates after each
/// choice.
struct Homomorphism<'a> {
    from: &'a QueryGraph,
    into: &'a QueryGraph,
    /// Outgoing / incoming `(label, other end)` per vertex of `from`.
    out_from: Adjacency,
    in_from: Adjacency,
    /// Outgoing / incoming `(label, other end)` per vertex of `into`.
    out_into: Adjacency,
    in_into: Adjacency,
    /// Try `v -> v` before other images; set for endomorphisms.
    prefer_identity: bool,
}

impl<'a> Homomorphism<'a> {
    fn new(from: &'a QueryGraph, into: &'a QueryGraph, prefer_identity: bool) -> Self {
        let (out_from, in_from) = adjacency(from);
        let (out_into, in_into) = adjacency(into);
        Self {
            from,
            into,
            out_from,
            in_from,
            out_into,
            in_into,
            prefer_identity,
        }
    }

    /// Any homomorphism from `from` into `into`.
    fn search(from: &'a QueryGraph, into: &'a QueryGraph) -> Option<Vec<u32>> {
        let search = Self::new(from, into, false);
        let domains = search.initial_domains()?;
        search.solve(domains)
    }

    /// An endomorphism of `graph` whose image misses at least one vertex.
    ///
    /// Domains are made consistent once; each non-terminal vertex is then
    /// tried as the missing one by dropping it from every domain.
    fn non_surjective(graph: &'a QueryGraph) -> Option<Vec<u32>> {
        let search = Self::new(graph, graph, true);
        let domains = search.initial_domains()?;

        (0..graph.vertex_count)
            .filter(|&x| x != graph.source && x != graph.target)
            // x is its own only image, so every endomorphism hits it
            .filter(|&x| domains[x as usize] != [x])
            .find_map(|x| {
                let without: Domains = domains
                    .iter()
                    .map(|domain| domain.iter().copied().filter(|&w| w != x).collect())
                    .collect();
                if without.iter().any(Vec::is_empty) {
                    return None;
                }
                search.propagate(without).and_then(|d| search.solve(d))
            })
    }

    /// Label-compatible, arc-consistent domains with the terminals fixed.
    fn initial_domains(&self) -> Option<Domains> {
        if self.from.is_loop() && !self.into.is_loop() {
            return None;
        }

        let mut domains = Vec::with_capacity(self.from.vertex_count as usize);
        for v in 0..self.from.vertex_count {
            let domain: Vec<u32> = if v == self.from.source {
                vec![self.into.source]
            } else if v == self.from.target {
                vec![self.into.target]
            } else {
                (0..self.into.vertex_count).collect()
            };
            let domain: Vec<u32> = domain
                .into_iter()
                .filter(|&w| self.compatible(v, w))
                .collect();
            if domain.is_empty() {
                return None;
            }
            domains.push(domain);
        }

        self.propagate(domains)
    }

    /// `w` has every outgoing and incoming label of `v`, and every loop.
    fn compatible(&self, v: u32, w: u32) -> bool {
        let carries = |edges: &[(u32, u32)], label: u32| edges.iter().any(|&(l, _)| l == label);
        let out_w = &self.out_into[w as usize];
        let in_w = &self.in_into[w as usize];

        self.out_from[v as usize].iter().all(|&(label, u)| {
            if u == v {
                self.into.edges.contains(&Edge::new(w, w, label))
            } else {
                carries(out_w, label)
            }
        }) && self.in_from[v as usize]
            .iter()
            .all(|&(label, _)| carries(in_w, label))
    }

    /// Drop unsupported images until nothing changes; `None` once a domain
    /// runs empty.
    fn propagate(&self, mut domains: Domains) -> Option<Domains> {
        loop {
            let mut changed = false;
            for edge in &self.from.edges {
                if edge.src == edge.trg {
                    continue;
                }
                let (a, b) = (edge.src as usize, edge.trg as usize);

                let kept = Self::supported(&domains[a], &domains[b], &self.out_into, edge.label);
                if kept.len() != domains[a].len() {
                    if kept.is_empty() {
                        return None;
                    }
                    domains[a] = kept;
                    changed = true;
                }

                let kept = Self::supported(&domains[b], &domains[a], &self.in_into, edge.label);
                if kept.len() != domains[b].len() {
                    if kept.is_empty() {
                        return None;
                    }
                    domains[b] = kept;
                    changed = true;
                }
            }
            if !changed {
                return Some(domains);
            }
        }
    }

    /// Images in `domain` with a `label` edge (per `edges`) into `other`.
    fn supported(domain: &[u32], other: &[u32], edges: &Adjacency, label: u32) -> Vec<u32> {
        domain
            .iter()
            .copied()
            .filter(|&w| {
                edges[w as usize]
                    .iter()
                    .any(|&(l, x)| l == label && other.binary_search(&x).is_ok())
            })
            .collect()
    }

    /// Branch on the smallest open domain until every domain is a single
    /// image. Arc consistency then guarantees every edge is preserved.
    fn solve(&self, domains: Domains) -> Option<Vec<u32>> {
        let open = (0..domains.len())
            .filter(|&v| domains[v].len() > 1)
            .min_by_key(|&v| domains[v].len());
        let Some(v) = open else {
            return domains.iter().map(|domain| domain.first().copied()).collect();
        };

        for image in self.ordered(v as u32, &domains[v]) {
            let mut next = domains.clone();
            next[v] = vec![image];
            if let Some(mapping) = self.propagate(next).and_then(|d| self.solve(d)) {
                return Some(mapping);
            }
        }
        None
    }

    fn ordered(&self, v: u32, domain: &[u32]) -> Vec<u32> {
        if self.prefer_identity && domain.binary_search(&v).is_ok() {
            std::iter::once(v)
                .chain(domain.iter().copied().filter(|&w| w != v))
                .collect()
        } else {
            domain.to_vec()
        }
    }
}

type Adjacency = Vec<Vec<(u32, u32)>>;

fn adjacency(graph: &QueryGraph) -> (Adjacency, Adjacency) {
    let n = graph.vertex_count as usize;
    let mut out = vec![Vec::new(); n];
    let mut inc = vec![Vec::new(); n];
    for e in &graph.edges {
        out[e.src as usize].push((e.label, e.trg));
        inc[e.trg as usize].push((e.label, e.src));
    }
    (out, inc)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(text: &str) -> QueryGraph {
        Cpq::parse(text).expect("parse").to_query_graph()
    }

    #[test]
    fn single_label_graph() {
        let g = graph("3");
        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.edges().copied().collect::<Vec<_>>(), vec![Edge::new(0, 1, 3)]);
    }

    #[test]
    fn inverse_label_reverses_edge() {
        let g = graph("3⁻");
        assert_eq!(g.edges().copied().collect::<Vec<_>>(), vec![Edge::new(1, 0, 3)]);
    }

    #[test]
    fn identity_merges_endpoints() {
        let g = graph("id");
        assert_eq!(g.vertex_count(), 1);
        assert!(g.is_loop());

        let g = graph("(0◦0⁻) ∩ id");
        assert_eq!(g.vertex_count(), 2);
        assert!(g.is_loop());
        // s -0-> m and t -0-> m collapse into one edge once s = t
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn concat_introduces_middle_vertex() {
        let g = graph("0◦1");
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.source(), 0);
        assert_eq!(g.target(), 1);
        assert_eq!(
            g.edges().copied().collect::<Vec<_>>(),
            vec![Edge::new(0, 2, 0), Edge::new(2, 1, 1)]
        );
    }

    #[test]
    fn duplicate_branch_retracts() {
        // both branches map onto one copy
        let g = graph("(0◦1) ∩ (0◦1)").core();
        assert_eq!(g, graph("0◦1"));
    }

    #[test]
    fn redundant_branch_retracts() {
        // the second 0◦1 folds onto the first
        let g = graph("((0◦1) ∩ 2) ∩ (0◦1)").core();
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.edge_count(), 3);
    }

    #[test]
    fn distinct_branches_are_kept() {
        let g = graph("(0◦1) ∩ (0◦2)").core();
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.edge_count(), 4);
    }

    #[test]
    fn loop_with_parallel_paths_retracts() {
        // s -0-> a -0-> s and s -0-> b -0-> s: b folds onto a
        let g = graph("((0◦0) ∩ id) ∩ (0◦0)").core();
        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn wide_intersection_of_copies_retracts() {
        let copies = vec!["(0◦1◦2)"; 8].join(" ∩ ");
        let g = graph(&copies);
        assert_eq!(g.vertex_count(), 18);
        assert_eq!(g.core(), graph("0◦1◦2"));
    }

    #[test]
    fn distinct_long_branches_survive() {
        let g = graph("(0◦1◦2) ∩ (0◦2◦1) ∩ (1◦0◦2) ∩ (0◦1◦2)").core();
        assert_eq!(g.vertex_count(), 8);
        assert_eq!(g.edge_count(), 9);
    }

    #[test]
    fn labels_narrow_initial_domains() {
        let g = graph("0◦1");
        let search = Homomorphism::new(&g, &g, true);
        let domains = search.initial_domains().expect("domains");
        assert_eq!(domains, vec![vec![0], vec![1], vec![2]]);
        assert!(Homomorphism::non_surjective(&g).is_none());
    }

    #[test]
    fn non_surjective_endomorphism_misses_a_vertex() {
        let g = graph("(0◦1) ∩ (0◦1)");
        assert_eq!(g.vertex_count(), 4);
        let mapping = Homomorphism::non_surjective(&g).expect("endomorphism");
        assert_eq!(&mapping[..2], &[0, 1]);
        assert_eq!(mapping[2], mapping[3]);
    }

    #[test]
    fn loop_never_maps_into_a_path() {
        assert!(!graph("0 ∩ id").maps_into(&graph("0")));
        assert!(graph("0").maps_into(&graph("0 ∩ id")));
    }

    #[test]
    fn homomorphism_fixes_terminals() {
        let path = graph("0◦0");
        let single = graph("0");
        assert!(!path.maps_into(&single));
        assert!(graph("(0◦1) ∩ (0◦2)").maps_into(&graph("(0◦1) ∩ (0◦2)")));
        assert!(graph("0◦1").maps_into(&graph("(0◦1) ∩ (0◦2)")));
        assert!(!graph("(0◦1) ∩ (0◦2)").maps_into(&graph("0◦1")));
    }
}
