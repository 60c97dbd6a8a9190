//! The checksum balancer.
//!
//! Peeling is greedy, and it tends to leave some app-versions with a huge defining set while others
//! are left with one or two checksums, or none at all. The balancer moves checksums back from rich
//! app-versions to poor ones which originally released them.
//!
//! Moving a checksum `c` from owner `lhs` back to `rhs` (which released it) flips the dependency
//! between them: before, `lhs -> rhs` (some checksum `lhs` owns depends on `rhs`). After, `rhs ->
//! lhs`, and `rhs` also inherits the rest of `c`'s depends-on set. That can close a cycle, so every
//! move is checked against a topological order of the dependency graph which is maintained
//! incrementally:
//!
//! - Ranks are sparse (see [`RANK_SPACING`]). For every edge `X -> Y`, `rank[Y] < rank[X]`.
//! - A move from `lhs` to `rhs` is safe iff no predecessor of `rhs` ranks below `lhs`. Any path
//!   from `lhs` (or from something `lhs` depends on) back to `rhs` would have to enter `rhs`
//!   through such a predecessor.
//! - After the move only `rhs` needs a new rank. Its successors now all rank at or below `lhs`, and
//!   its predecessors all rank above `lhs`, so a free rank is looked for in between. If the gap is
//!   used up, everything is re-sorted from scratch.
//!
//! All of a receiver's checksums held by one donor move together. Moving only some of them would
//! leave the old `lhs -> rhs` edge in place next to the new `rhs -> lhs` edge.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use crate::graph::deps::RANK_SPACING;
use crate::graph::{DepGraph, Graph};
use crate::{AvIdx, CsIdx, IdxSet, InvariantViolation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BalanceReport {
    /// Number of passes over the candidate receivers.
    pub iterations: usize,
    /// Number of committed (donor, receiver) group transfers.
    pub transfers: usize,
    /// Number of checksums which changed owner.
    pub moved_checksums: usize,
    /// Number of times the rank gap ran out and the whole graph was re-sorted.
    pub full_resorts: usize,
    /// False if the iteration bound was hit while transfers were still happening.
    pub converged: bool,
}

pub struct ChecksumBalancer<'a> {
    graph: &'a mut Graph,
    /// Defining set size to aim for.
    max: usize,

    deps: DepGraph,
    /// Topological rank of each local node.
    ranks: Vec<u64>,
    used_ranks: HashSet<u64>,

    report: BalanceReport,
}

impl<'a> ChecksumBalancer<'a> {
    /// Set up the balancer over a peeled graph. Fails if some checksum doesn't have exactly one
    /// owner, or if the dependency graph already has a cycle.
    pub fn new(graph: &'a mut Graph, max: usize) -> Result<Self, InvariantViolation> {
        graph.check_single_owners()?;
        let deps = DepGraph::from_graph(graph);
        let ranks = deps.topological_ranks(graph)?;
        let used_ranks = ranks.iter().copied().collect();

        Ok(Self {
            graph,
            max,
            deps,
            ranks,
            used_ranks,
            report: BalanceReport::default(),
        })
    }

    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    pub fn report(&self) -> BalanceReport {
        self.report
    }

    /// Run up to `max_iterations` passes, stopping early once a pass changes nothing.
    pub fn run(&mut self, max_iterations: usize) -> Result<BalanceReport, InvariantViolation> {
        info!(app_versions = self.deps.len(), max = self.max, "balancing checksums started");

        self.report.converged = false;
        for _ in 0..max_iterations {
            let before = self.report.transfers;
            self.report.iterations += 1;

            // Most starved receivers first.
            let mut receivers: Vec<AvIdx> = self.graph.live_app_versions()
                .filter(|&av| {
                    let e = self.graph.av(av);
                    !e.released.is_empty() && e.checksums.len() < self.max
                })
                .collect();
            receivers.sort_by_key(|&av| self.graph.av(av).checksums.len());

            for rhs in receivers {
                self.try_receive(rhs)?;
            }

            debug!(iteration = self.report.iterations, transfers = self.report.transfers - before, "balancer pass");
            if self.report.transfers == before {
                self.report.converged = true;
                break;
            }
        }

        if !self.report.converged {
            warn!(iterations = self.report.iterations, "balancer stopped at its iteration bound while still making progress");
        }
        info!(
            transfers = self.report.transfers,
            moved_checksums = self.report.moved_checksums,
            full_resorts = self.report.full_resorts,
            "balancing checksums done"
        );
        Ok(self.report)
    }

    fn try_receive(&mut self, rhs: AvIdx) -> Result<(), InvariantViolation> {
        let mut by_owner: BTreeMap<AvIdx, Vec<CsIdx>> = BTreeMap::new();
        for &cs in self.graph.av(rhs).released.iter() {
            let entry = self.graph.cs(cs);
            let owner = entry.owner().ok_or(InvariantViolation::NotSingleOwner {
                checksum: entry.key,
                owners: entry.app_versions.len(),
            })?;
            by_owner.entry(owner).or_default().push(cs);
        }

        for (lhs, group) in by_owner {
            let rhs_size = self.graph.av(rhs).checksums.len();
            if rhs_size >= self.max { break; }

            let k = group.len();
            let lhs_size = self.graph.av(lhs).checksums.len();
            // The donor owns the whole group, so lhs_size >= k.
            let lhs_after = lhs_size - k;
            let honest = lhs_after >= rhs_size + k;
            if !honest || lhs_after < self.max { continue; }

            if self.reverse_is_acyclic(lhs, rhs) {
                self.reverse(lhs, rhs, &group)?;
            }
        }
        Ok(())
    }

    fn local(&self, av: AvIdx) -> usize {
        // Every live app-version is a node, and only live ones are ever linked to checksums.
        self.deps.local(av).unwrap_or(usize::MAX)
    }

    fn reverse_is_acyclic(&self, lhs: AvIdx, rhs: AvIdx) -> bool {
        let lhs_rank = self.ranks[self.local(lhs)];
        self.deps.inv(self.local(rhs)).iter().all(|p| self.ranks[p] >= lhs_rank)
    }

    /// Move `group` (every checksum `rhs` released which `lhs` owns) from `lhs` to `rhs`.
    fn reverse(&mut self, lhs: AvIdx, rhs: AvIdx, group: &[CsIdx]) -> Result<(), InvariantViolation> {
        let (l, r) = (self.local(lhs), self.local(rhs));

        // Everything else the moved checksums depend on. rhs will depend on these too.
        let inherited: IdxSet = group.iter()
            .flat_map(|&cs| self.graph.cs(cs).depends_on.iter())
            .filter(|&av| av != lhs && av != rhs)
            .filter_map(|av| self.deps.local(av))
            .collect();

        for &cs in group {
            self.graph.transfer(lhs, rhs, cs);
        }

        let l_out = self.deps.compute_out(&*self.graph, l);
        *self.deps.out_mut(l) = l_out;
        let r_out = self.deps.out_mut(r);
        r_out.extend(inherited.iter());
        r_out.insert(l);

        self.deps.inv_mut(l).insert(r);
        self.deps.inv_mut(r).remove(l);
        for d in inherited.iter() {
            self.deps.inv_mut(d).insert(r);
            if !self.deps.out(l).contains(d) {
                self.deps.inv_mut(d).remove(l);
            }
        }

        self.report.transfers += 1;
        self.report.moved_checksums += group.len();
        self.repair_rank(r)
    }

    fn repair_rank(&mut self, node: usize) -> Result<(), InvariantViolation> {
        let lo = self.deps.out(node).iter().map(|s| self.ranks[s]).max().unwrap_or(0);
        let hi = self.deps.inv(node).iter().map(|p| self.ranks[p]).min().unwrap_or(u64::MAX);

        match self.find_free_rank(lo, hi) {
            Some(rank) => {
                self.used_ranks.remove(&self.ranks[node]);
                self.used_ranks.insert(rank);
                self.ranks[node] = rank;
            }
            None => {
                debug!(lo, hi, "rank gap exhausted, re-sorting dependency graph");
                self.ranks = self.deps.topological_ranks(&*self.graph)?;
                self.used_ranks.clear();
                self.used_ranks.extend(self.ranks.iter().copied());
                self.report.full_resorts += 1;
            }
        }
        Ok(())
    }

    /// Binary probe for an unused rank strictly between `lo` and `hi`. Probes the midpoint, then
    /// keeps halving upwards, then downwards.
    fn find_free_rank(&self, lo: u64, hi: u64) -> Option<u64> {
        if hi <= lo.saturating_add(1) { return None; }
        let (first, last) = (lo + 1, hi - 1);

        let mut low = first;
        loop {
            let mid = low + (last - low) / 2;
            if !self.used_ranks.contains(&mid) { return Some(mid); }
            if mid == last { break; }
            low = mid + 1;
        }

        let mut high = last;
        loop {
            let mid = first + (high - first) / 2;
            if !self.used_ranks.contains(&mid) { return Some(mid); }
            if mid == first { break; }
            high = mid - 1;
        }
        None
    }

    /// The consistency oracle. Recomputes the dependency graph from the checksums' ownership
    /// data and checks it matches the incrementally maintained graph and inverse graph, that the
    /// maintained ranks are a valid topological order, and that the recomputed graph is acyclic.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let graph = &*self.graph;
        graph.check_links()?;
        graph.check_single_owners()?;
        self.deps.check_matches(graph)?;
        self.deps.check_ranks(graph, &self.ranks)?;
        DepGraph::from_graph(graph).topological_ranks(graph)?;
        debug_assert_eq!(self.used_ranks.len(), self.ranks.len());
        Ok(())
    }

    #[allow(unused)]
    pub(crate) fn dbg_check(&self) {
        if let Err(e) = self.verify() {
            panic!("Balancer state is inconsistent: {e}");
        }
        assert!(self.ranks.iter().all(|r| *r > 0 && self.used_ranks.contains(r)));
    }
}

/// Balance a peeled graph. With `verify` set, the consistency oracle runs once the loop is done.
pub fn balance(graph: &mut Graph, max: usize, max_iterations: usize, verify: bool) -> Result<BalanceReport, InvariantViolation> {
    let mut balancer = ChecksumBalancer::new(graph, max)?;
    let report = balancer.run(max_iterations)?;
    if verify {
        balancer.verify()?;
    }
    Ok(report)
}
