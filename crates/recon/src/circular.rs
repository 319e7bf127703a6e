//! Circular trading detection.
//!
//! Supplier → recipient relationships form a directed graph; every simple
//! cycle at or above the length threshold is a candidate trading ring.
//! Cycles are enumerated with Johnson's algorithm (iterative form),
//! restarting from the strongly connected components of what remains after
//! each start node is exhausted.

use std::collections::BTreeSet;

use crate::dataset::Dataset;
use crate::evidence::Findings;
use crate::model::{DiscrepancySet, Reason, Subject};

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Directed graph over counterparty identifiers. Repeated relationships
/// collapse into one edge; self-loops are dropped.
#[derive(Debug, Clone, Default)]
pub struct TransactionGraph {
    nodes: Vec<String>,
    adjacency: Vec<BTreeSet<usize>>,
}

impl TransactionGraph {
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let edges: Vec<(&str, &str)> = edges.into_iter().filter(|(s, r)| s != r).collect();

        // Sorted ids keep enumeration order independent of input order.
        let names: BTreeSet<&str> = edges.iter().flat_map(|(s, r)| [*s, *r]).collect();
        let nodes: Vec<String> = names.into_iter().map(String::from).collect();

        let mut adjacency = vec![BTreeSet::new(); nodes.len()];
        for (s, r) in edges {
            if let (Ok(si), Ok(ri)) = (
                nodes.binary_search_by(|n| n.as_str().cmp(s)),
                nodes.binary_search_by(|n| n.as_str().cmp(r)),
            ) {
                adjacency[si].insert(ri);
            }
        }
        Self { nodes, adjacency }
    }

    /// One edge per row with both identifiers present. Identifiers are
    /// trimmed; blank or null ends are skipped.
    pub fn from_dataset(ds: &Dataset, supplier: &str, recipient: &str) -> Self {
        let pairs: Vec<(String, String)> = ds
            .rows()
            .filter_map(|row| {
                let s = row.get(supplier).repr()?.trim().to_string();
                let r = row.get(recipient).repr()?.trim().to_string();
                (!s.is_empty() && !r.is_empty()).then_some((s, r))
            })
            .collect();
        Self::from_edges(pairs.iter().map(|(s, r)| (s.as_str(), r.as_str())))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeSet::len).sum()
    }

    /// Enumerate simple cycles of at least `min_length` nodes, subject to
    /// `limits`. Each cycle starts at its lexicographically smallest node.
    pub fn simple_cycles(&self, min_length: usize, limits: &CycleLimits) -> CycleSearch {
        if let Some(max) = limits.max_nodes {
            if self.node_count() > max {
                return CycleSearch {
                    cycles: Vec::new(),
                    truncated: Some(Truncation::MaxNodes(max)),
                };
            }
        }

        let all: Vec<usize> = (0..self.node_count()).collect();
        let mut pending: Vec<Vec<usize>> = strongly_connected(&self.adjacency, &all)
            .into_iter()
            .filter(|c| c.len() > 1)
            .collect();

        let mut search = Search {
            adjacency: &self.adjacency,
            min_length,
            limits,
            found: Vec::new(),
            truncated: None,
        };

        while let Some(mut component) = pending.pop() {
            component.sort_unstable();
            search.from_start(&component);
            if search.truncated.is_some() {
                break;
            }
            pending.extend(
                strongly_connected(&self.adjacency, &component[1..])
                    .into_iter()
                    .filter(|c| c.len() > 1),
            );
        }

        let mut found = search.found;
        found.sort();
        CycleSearch {
            cycles: found
                .into_iter()
                .map(|c| c.into_iter().map(|i| self.nodes[i].clone()).collect())
                .collect(),
            truncated: search.truncated,
        }
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Bounds on cycle enumeration, whose cost is exponential in the worst case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleLimits {
    /// Refuse to enumerate graphs with more nodes than this.
    pub max_nodes: Option<usize>,
    /// Stop after this many reported cycles.
    pub max_cycles: Option<usize>,
    /// Do not follow paths longer than this.
    pub max_length: Option<usize>,
}

impl Default for CycleLimits {
    fn default() -> Self {
        Self {
            max_nodes: None,
            max_cycles: Some(10_000),
            max_length: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    MaxNodes(usize),
    MaxCycles(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSearch {
    pub cycles: Vec<Vec<String>>,
    /// Set when a limit stopped enumeration; `cycles` is then partial.
    pub truncated: Option<Truncation>,
}

// ---------------------------------------------------------------------------
// Johnson's circuit search
// ---------------------------------------------------------------------------

struct Search<'g> {
    adjacency: &'g [BTreeSet<usize>],
    min_length: usize,
    limits: &'g CycleLimits,
    found: Vec<Vec<usize>>,
    truncated: Option<Truncation>,
}

impl Search<'_> {
    /// All cycles through `component[0]` inside `component` (sorted).
    fn from_start(&mut self, component: &[usize]) {
        let n = self.adjacency.len();
        let start = component[0];
        let mut member = vec![false; n];
        for &v in component {
            member[v] = true;
        }
        // Descending, so popping yields ascending neighbor order.
        let successors = |v: usize| -> Vec<usize> {
            self.adjacency[v].iter().rev().copied().filter(|w| member[*w]).collect()
        };

        let mut path = vec![start];
        let mut blocked = vec![false; n];
        let mut closed = vec![false; n];
        let mut blockers: Vec<Vec<usize>> = vec![Vec::new(); n];
        blocked[start] = true;
        let mut stack: Vec<(usize, Vec<usize>)> = vec![(start, successors(start))];

        loop {
            let Some((this, nbrs)) = stack.last_mut() else { break };
            let this = *this;
            let next = nbrs.pop();
            let exhausted = nbrs.is_empty();

            if let Some(next) = next {
                if next == start {
                    if !self.emit(&path) {
                        return;
                    }
                    for &p in &path {
                        closed[p] = true;
                    }
                } else if !blocked[next] {
                    if self.limits.max_length.map_or(true, |max| path.len() < max) {
                        path.push(next);
                        closed[next] = false;
                        blocked[next] = true;
                        stack.push((next, successors(next)));
                        continue;
                    }
                    // Cut short by the length bound: unblock conservatively
                    // so no cycle through these nodes is missed later.
                    for &p in &path {
                        closed[p] = true;
                    }
                }
            }

            if exhausted {
                if closed[this] {
                    unblock(this, &mut blocked, &mut blockers);
                } else {
                    for &w in self.adjacency[this].iter().filter(|w| member[**w]) {
                        if !blockers[w].contains(&this) {
                            blockers[w].push(this);
                        }
                    }
                }
                stack.pop();
                path.pop();
            }
        }
    }

    /// Record a closed path. Returns false once the cycle budget is spent.
    fn emit(&mut self, path: &[usize]) -> bool {
        if path.len() < self.min_length {
            return true;
        }
        if let Some(max) = self.limits.max_cycles {
            if self.found.len() >= max {
                self.truncated = Some(Truncation::MaxCycles(max));
                return false;
            }
        }
        self.found.push(path.to_vec());
        true
    }
}

fn unblock(node: usize, blocked: &mut [bool], blockers: &mut [Vec<usize>]) {
    let mut stack = vec![node];
    while let Some(v) = stack.pop() {
        if blocked[v] {
            blocked[v] = false;
            stack.append(&mut blockers[v]);
        }
    }
}

/// Tarjan's strongly connected components over the subgraph induced by
/// `members`, without recursion.
fn strongly_connected(adjacency: &[BTreeSet<usize>], members: &[usize]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;
    let n = adjacency.len();
    let mut member = vec![false; n];
    for &m in members {
        member[m] = true;
    }

    let mut index = vec![UNVISITED; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components = Vec::new();

    let successors =
        |v: usize| -> Vec<usize> { adjacency[v].iter().copied().filter(|w| member[*w]).collect() };

    for &root in members {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next_index;
        low[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut work: Vec<(usize, Vec<usize>, usize)> = vec![(root, successors(root), 0)];

        loop {
            let Some(frame) = work.last_mut() else { break };
            let v = frame.0;
            if frame.2 < frame.1.len() {
                let w = frame.1[frame.2];
                frame.2 += 1;
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    low[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    work.push((w, successors(w), 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
            } else {
                work.pop();
                if let Some(parent) = work.last() {
                    let p = parent.0;
                    low[p] = low[p].min(low[v]);
                }
                if low[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    components.push(component);
                }
            }
        }
    }
    components
}

// ---------------------------------------------------------------------------
// Check
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CircularPlan {
    pub check: String,
    pub document: String,
    pub supplier_column: String,
    pub recipient_column: String,
    /// Minimum ring size reported.
    pub threshold: usize,
    pub limits: CycleLimits,
}

/// Flag every counterparty ring of at least `threshold` members.
pub fn detect_circular_trading(plan: &CircularPlan, ds: &Dataset) -> DiscrepancySet {
    let mut findings = Findings::new();

    let missing: Vec<Reason> = ds
        .missing_columns(&[plan.supplier_column.as_str(), plan.recipient_column.as_str()])
        .into_iter()
        .map(|column| Reason::MissingColumn {
            document: plan.document.clone(),
            column: column.to_string(),
        })
        .collect();
    if !missing.is_empty() {
        findings.record(Subject::Dataset { document: plan.document.clone() }, missing);
        return findings.skip(&plan.check);
    }

    let graph = TransactionGraph::from_dataset(ds, &plan.supplier_column, &plan.recipient_column);
    let search = graph.simple_cycles(plan.threshold, &plan.limits);
    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        cycles = search.cycles.len(),
        "circular trading search complete"
    );

    for nodes in search.cycles {
        let length = nodes.len();
        findings.record(Subject::Cycle { nodes }, vec![Reason::CircularTrading { length }]);
    }

    if let Some(truncation) = search.truncated {
        let (limit, value) = match truncation {
            Truncation::MaxNodes(v) => ("max_nodes", v),
            Truncation::MaxCycles(v) => ("max_cycles", v),
        };
        tracing::warn!(check = %plan.check, limit, value, "cycle enumeration truncated");
        findings.record(
            Subject::Dataset { document: plan.document.clone() },
            vec![Reason::CycleLimitReached {
                limit: limit.to_string(),
                value,
            }],
        );
    }

    findings.finish(&plan.check)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycles(edges: &[(&str, &str)], min_length: usize) -> Vec<Vec<String>> {
        TransactionGraph::from_edges(edges.iter().copied())
            .simple_cycles(min_length, &CycleLimits::default())
            .cycles
    }

    #[test]
    fn triangle_is_one_cycle() {
        let found = cycles(&[("A", "B"), ("B", "C"), ("C", "A")], 3);
        assert_eq!(found, vec![vec!["A", "B", "C"]]);
    }

    #[test]
    fn broken_triangle_has_no_cycle() {
        assert!(cycles(&[("A", "B"), ("B", "C")], 3).is_empty());
    }

    #[test]
    fn reciprocal_pair_below_threshold() {
        assert!(cycles(&[("A", "B"), ("B", "A")], 3).is_empty());
        assert_eq!(cycles(&[("A", "B"), ("B", "A")], 2), vec![vec!["A", "B"]]);
    }

    #[test]
    fn self_loops_and_duplicates_collapse() {
        let g = TransactionGraph::from_edges([("A", "A"), ("A", "B"), ("A", "B"), ("B", "A")]);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);
        assert!(g.simple_cycles(1, &CycleLimits::default()).cycles.iter().all(|c| c.len() == 2));
    }

    #[test]
    fn complete_graph_on_four_nodes() {
        // K4 has 20 simple directed cycles: 6 of length 2, 8 of length 3, 6 of length 4.
        let names = ["A", "B", "C", "D"];
        let mut edges = Vec::new();
        for a in names {
            for b in names {
                if a != b {
                    edges.push((a, b));
                }
            }
        }
        assert_eq!(cycles(&edges, 2).len(), 20);
        assert_eq!(cycles(&edges, 3).len(), 14);
        assert_eq!(cycles(&edges, 4).len(), 6);
    }

    #[test]
    fn every_cycle_is_simple_and_closed() {
        let edges = [
            ("A", "B"), ("B", "C"), ("C", "A"), ("C", "D"), ("D", "E"), ("E", "C"), ("E", "A"),
        ];
        let g = TransactionGraph::from_edges(edges);
        for cycle in g.simple_cycles(3, &CycleLimits::default()).cycles {
            let unique: BTreeSet<&String> = cycle.iter().collect();
            assert_eq!(unique.len(), cycle.len());
            for w in cycle.windows(2) {
                assert!(edges.contains(&(w[0].as_str(), w[1].as_str())));
            }
            let closing = (cycle[cycle.len() - 1].as_str(), cycle[0].as_str());
            assert!(edges.contains(&closing));
        }
    }

    #[test]
    fn cycle_cap_truncates() {
        let names = ["A", "B", "C", "D"];
        let mut edges = Vec::new();
        for a in names {
            for b in names {
                if a != b {
                    edges.push((a, b));
                }
            }
        }
        let limits = CycleLimits {
            max_cycles: Some(3),
            ..CycleLimits::default()
        };
        let search = TransactionGraph::from_edges(edges).simple_cycles(3, &limits);
        assert_eq!(search.cycles.len(), 3);
        assert_eq!(search.truncated, Some(Truncation::MaxCycles(3)));
    }

    #[test]
    fn length_bound_still_finds_short_rings() {
        let edges = [("A", "B"), ("B", "C"), ("C", "A"), ("C", "D"), ("D", "E"), ("E", "A")];
        let limits = CycleLimits {
            max_length: Some(3),
            ..CycleLimits::default()
        };
        let search = TransactionGraph::from_edges(edges).simple_cycles(3, &limits);
        assert_eq!(search.cycles, vec![vec!["A", "B", "C"]]);
    }

    #[test]
    fn node_cap_refuses_large_graphs() {
        let limits = CycleLimits {
            max_nodes: Some(2),
            ..CycleLimits::default()
        };
        let search = TransactionGraph::from_edges([("A", "B"), ("B", "C"), ("C", "A")]).simple_cycles(3, &limits);
        assert!(search.cycles.is_empty());
        assert_eq!(search.truncated, Some(Truncation::MaxNodes(2)));
    }
}
