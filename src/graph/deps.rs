//! The dependency graph between app-versions, lifted from the checksum-level depends-on relation.
//!
//! There is an edge `X -> Y` iff some checksum X currently owns depends on Y. Nodes are the live
//! app-versions, renumbered densely ("local" ids) so the adjacency lists can be plain vectors.

use crate::graph::Graph;
use crate::{AvIdx, IdxSet, InvariantViolation};

/// Gap left between consecutive ranks after a full topological sort. This leaves plenty of room to
/// slot a moved node in between its neighbours without renumbering anything else.
pub const RANK_SPACING: u64 = 1 << 30;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepGraph {
    /// Local id -> arena index.
    nodes: Vec<AvIdx>,
    /// Arena index -> local id. None for removed entries.
    local: Vec<Option<usize>>,

    out: Vec<IdxSet>,
    inv: Vec<IdxSet>,
}

impl DepGraph {
    /// Derive the dependency graph (and its inverse) from the current ownership data.
    pub fn from_graph(graph: &Graph) -> Self {
        let nodes: Vec<AvIdx> = graph.live_app_versions().collect();
        let mut local = vec![None; graph.app_version_arena_len()];
        for (i, &av) in nodes.iter().enumerate() {
            local[av] = Some(i);
        }

        let n = nodes.len();
        let mut result = Self {
            nodes,
            local,
            out: vec![IdxSet::new(); n],
            inv: vec![IdxSet::new(); n],
        };

        for x in 0..n {
            let out = result.compute_out(graph, x);
            for y in out.iter() {
                result.inv[y].insert(x);
            }
            result.out[x] = out;
        }
        result
    }

    /// The out edges of `node` according to the graph's current ownership data.
    pub(crate) fn compute_out(&self, graph: &Graph, node: usize) -> IdxSet {
        let av = graph.av(self.nodes[node]);
        IdxSet::from_unsorted_iter(av.checksums.iter()
            .flat_map(|&cs| graph.cs(cs).depends_on.iter())
            .filter_map(|d| self.local[d]))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn num_edges(&self) -> usize {
        self.out.iter().map(|e| e.len()).sum()
    }

    /// The arena index of a local node id.
    pub fn node(&self, local: usize) -> AvIdx {
        self.nodes[local]
    }

    /// The local node id of an arena index.
    pub fn local(&self, av: AvIdx) -> Option<usize> {
        self.local.get(av).copied().flatten()
    }

    pub fn out(&self, node: usize) -> &IdxSet {
        &self.out[node]
    }

    /// Nodes with an edge into `node`.
    pub fn inv(&self, node: usize) -> &IdxSet {
        &self.inv[node]
    }

    pub(crate) fn out_mut(&mut self, node: usize) -> &mut IdxSet {
        &mut self.out[node]
    }

    pub(crate) fn inv_mut(&mut self, node: usize) -> &mut IdxSet {
        &mut self.inv[node]
    }

    fn key_err(&self, graph: &Graph, from: usize, to: usize, cycle: bool) -> InvariantViolation {
        let from = graph.av(self.nodes[from]).key.clone();
        let to = graph.av(self.nodes[to]).key.clone();
        if cycle {
            InvariantViolation::Cycle { from, to }
        } else {
            InvariantViolation::RankOrder { from, to }
        }
    }

    /// Assign every node a rank such that for each edge `X -> Y`, `rank[Y] < rank[X]`. Ranks are
    /// positive multiples of [`RANK_SPACING`].
    ///
    /// Fails if the graph has a cycle.
    pub fn topological_ranks(&self, graph: &Graph) -> Result<Vec<u64>, InvariantViolation> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark { New, Open, Done }

        let n = self.len();
        let mut mark = vec![Mark::New; n];
        let mut ranks = vec![0; n];
        let mut next_rank = RANK_SPACING;

        // (node, next out edge to visit)
        let mut stack: Vec<(usize, usize)> = Vec::new();
        for root in 0..n {
            if mark[root] != Mark::New { continue; }
            mark[root] = Mark::Open;
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                if let Some(&next) = self.out[node].as_slice().get(top.1) {
                    top.1 += 1;
                    match mark[next] {
                        Mark::New => {
                            mark[next] = Mark::Open;
                            stack.push((next, 0));
                        }
                        Mark::Open => return Err(self.key_err(graph, node, next, true)),
                        Mark::Done => {}
                    }
                } else {
                    // Post-order: everything this node depends on already has a smaller rank.
                    mark[node] = Mark::Done;
                    ranks[node] = next_rank;
                    next_rank += RANK_SPACING;
                    stack.pop();
                }
            }
        }

        Ok(ranks)
    }

    /// Check `ranks` is a valid topological order for this graph. A valid order also proves the
    /// graph is acyclic.
    pub fn check_ranks(&self, graph: &Graph, ranks: &[u64]) -> Result<(), InvariantViolation> {
        for (x, out) in self.out.iter().enumerate() {
            for y in out.iter() {
                if ranks[y] >= ranks[x] {
                    return Err(self.key_err(graph, x, y, false));
                }
            }
        }
        Ok(())
    }

    /// Compare this (incrementally maintained) graph to one freshly derived from `graph`.
    pub fn check_matches(&self, graph: &Graph) -> Result<(), InvariantViolation> {
        let fresh = Self::from_graph(graph);
        if fresh.nodes != self.nodes {
            // Removed or added entries. Report the first difference.
            let av = self.nodes.iter().zip(fresh.nodes.iter())
                .find(|(a, b)| a != b)
                .map(|(a, _)| *a)
                .or_else(|| self.nodes.get(fresh.nodes.len()).copied())
                .or_else(|| fresh.nodes.get(self.nodes.len()).copied())
                .unwrap_or(0);
            return Err(InvariantViolation::GraphMismatch(graph.av(av).key.clone()));
        }

        for i in 0..self.len() {
            if self.out[i] != fresh.out[i] {
                return Err(InvariantViolation::GraphMismatch(graph.av(self.nodes[i]).key.clone()));
            }
        }
        for i in 0..self.len() {
            if self.inv[i] != fresh.inv[i] {
                return Err(InvariantViolation::InverseGraphMismatch(graph.av(self.nodes[i]).key.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::test::{av, cs, graph_from};

    #[test]
    fn edges_follow_depends_on() {
        // a#1 releases its copy of checksum 1, so b#1 depends on a#1.
        let mut g = graph_from(&[("a#1", &[1, 2]), ("b#1", &[1])]);
        let a = g.find_app_version(&av("a#1")).unwrap();
        let b = g.find_app_version(&av("b#1")).unwrap();
        g.release(a, g.find_checksum(&cs(1)).unwrap());

        let d = DepGraph::from_graph(&g);
        let (la, lb) = (d.local(a).unwrap(), d.local(b).unwrap());
        assert_eq!(d.out(lb).as_slice(), &[la]);
        assert!(d.out(la).is_empty());
        assert_eq!(d.inv(la).as_slice(), &[lb]);
        assert_eq!(d.num_edges(), 1);

        let ranks = d.topological_ranks(&g).unwrap();
        assert!(ranks[la] < ranks[lb]);
        assert_eq!(ranks[la] % RANK_SPACING, 0);
        d.check_ranks(&g, &ranks).unwrap();
        d.check_matches(&g).unwrap();

        // Swapping the ranks breaks the order.
        let swapped = [ranks[1], ranks[0]];
        assert!(matches!(d.check_ranks(&g, &swapped), Err(InvariantViolation::RankOrder { .. })));
    }

    #[test]
    fn cycles_are_found() {
        // a and b both hold checksums 1 and 2. a keeps 1 and releases 2, b does the reverse.
        let mut g = graph_from(&[("a#1", &[1, 2]), ("b#1", &[1, 2])]);
        let a = g.find_app_version(&av("a#1")).unwrap();
        let b = g.find_app_version(&av("b#1")).unwrap();
        g.release(a, g.find_checksum(&cs(2)).unwrap());
        g.release(b, g.find_checksum(&cs(1)).unwrap());

        let d = DepGraph::from_graph(&g);
        assert!(matches!(d.topological_ranks(&g), Err(InvariantViolation::Cycle { .. })));
    }

    #[test]
    fn stale_edges_are_reported() {
        let mut g = graph_from(&[("a#1", &[1, 2]), ("b#1", &[1])]);
        let d = DepGraph::from_graph(&g);
        let a = g.find_app_version(&av("a#1")).unwrap();
        g.release(a, g.find_checksum(&cs(1)).unwrap());
        assert_eq!(d.check_matches(&g), Err(InvariantViolation::GraphMismatch(av("b#1"))));
    }
}
