//! The peeling solver.
//!
//! This decides which checksums *define* each app-version. App-versions are visited once each,
//! best first, from a priority queue keyed by how many checksums they own exclusively (then by how
//! many they own at all). When an app-version is visited it keeps the checksums nobody else owns
//! any more and releases the rest. Releasing a checksum makes it depend on the releaser, and bumps
//! the priority of everyone still holding that checksum: they are one step closer to owning it
//! outright.
//!
//! App-versions visited early pay for the ones visited late. Typically the newest version of an
//! application is visited first, keeps the files which only it has, and releases the shared files
//! to older versions.
//!
//! The bump is a priority signal, not an exact count of exclusive checksums. Ties on the key are
//! broken by arena index (so by identity, since the builder indexes in identity order), which makes
//! the visit order and the result a pure function of the input.

use std::cmp::Reverse;

use tracing::info;

use crate::graph::Graph;
use crate::pq::IndexedHeap;
use crate::{AvIdx, CsIdx};

/// `(exclusive checksums, owned checksums, Reverse(arena index))`, all maximized.
type PeelKey = (u32, usize, Reverse<AvIdx>);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeelReport {
    /// Arena indexes of live app-versions in the order they were visited.
    pub order: Vec<AvIdx>,
    /// Number of app-versions left owning at least one checksum.
    pub defined: usize,
    /// Number of app-versions which released everything.
    pub undefined: usize,
    /// Number of (checksum, app-version) ownership links released.
    pub released: usize,
}

/// Run the peeling pass over every live app-version. Afterwards every checksum has exactly one
/// owner, and the dependency graph between app-versions is acyclic.
pub fn peel(graph: &mut Graph) -> PeelReport {
    info!(app_versions = graph.num_app_versions(), "peeling started");

    let nodes: Vec<AvIdx> = graph.live_app_versions().collect();
    let mut local = vec![usize::MAX; graph.app_version_arena_len()];
    let keys: Vec<PeelKey> = nodes.iter().enumerate().map(|(i, &av)| {
        local[av] = i;
        let entry = graph.av(av);
        let exclusive = entry.checksums.iter()
            .filter(|&&cs| graph.cs(cs).app_versions.len() == 1)
            .count() as u32;
        (exclusive, entry.checksums.len(), Reverse(av))
    }).collect();

    let mut queue = IndexedHeap::from_keys(keys);
    let mut report = PeelReport {
        order: Vec::with_capacity(nodes.len()),
        ..PeelReport::default()
    };

    let mut scratch: Vec<CsIdx> = Vec::new();
    while let Some(next) = queue.pop() {
        let av = nodes[next];
        report.order.push(av);

        scratch.clear();
        scratch.extend(graph.av(av).checksums.iter()
            .copied()
            .filter(|&cs| graph.cs(cs).app_versions.len() > 1));

        for &cs in scratch.iter() {
            graph.release(av, cs);
            report.released += 1;
            for other in graph.cs(cs).app_versions.iter() {
                queue.update(local[other], |key| key.0 += 1);
            }
        }

        if graph.av(av).checksums.is_empty() {
            report.undefined += 1;
        } else {
            report.defined += 1;
        }
    }

    info!(defined = report.defined, undefined = report.undefined, released = report.released, "peeling done");
    report
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::test::{av, cs, graph_from};
    use crate::graph::DepGraph;
    use crate::inclusion::find_inclusions;
    use crate::merge::merge_same_checksums;

    fn owned(g: &Graph, name: &str) -> Vec<u32> {
        let idx = g.find_app_version(&av(name)).unwrap();
        g.av(idx).checksums.iter()
            .map(|&c| u32::from_be_bytes(g.cs(c).key.as_bytes()[28..].try_into().unwrap()))
            .collect()
    }

    #[test]
    fn superset_keeps_its_own_files() {
        let mut g = graph_from(&[
            ("app#1", &[1, 2, 3]),
            ("app#2", &[1, 2, 3, 4, 5, 6]),
        ]);
        find_inclusions(&mut g);
        let report = peel(&mut g);
        g.dbg_check();
        g.check_single_owners().unwrap();

        assert_eq!(report.defined, 2);
        assert_eq!(report.undefined, 0);
        assert_eq!(report.released, 3);
        let v2 = g.find_app_version(&av("app#2")).unwrap();
        assert_eq!(report.order[0], v2);

        assert_eq!(owned(&g, "app#2"), [4, 5, 6]);
        assert_eq!(owned(&g, "app#1"), [1, 2, 3]);
        for c in 1..=3 {
            let c = g.find_checksum(&cs(c)).unwrap();
            assert_eq!(g.cs(c).depends_on.as_slice(), &[v2]);
        }
    }

    #[test]
    fn ties_go_to_the_lower_identity() {
        // Both own one checksum exclusively and share the other.
        let mut g = graph_from(&[("a#1", &[1, 2]), ("b#1", &[1, 3])]);
        let report = peel(&mut g);
        assert_eq!(report.order[0], g.find_app_version(&av("a#1")).unwrap());
        assert_eq!(owned(&g, "a#1"), [2]);
        assert_eq!(owned(&g, "b#1"), [1, 3]);

        let mut g = graph_from(&[("a#1", &[1, 2]), ("b#1", &[1, 2, 3]), ("c#1", &[1, 2, 3])]);
        // b and c tie exactly. b is first by identity.
        let report = peel(&mut g);
        let b = g.find_app_version(&av("b#1")).unwrap();
        assert_eq!(report.order[0], b);
        assert_eq!(owned(&g, "b#1"), Vec::<u32>::new());
        assert_eq!(owned(&g, "c#1"), [3]);
        assert_eq!(owned(&g, "a#1"), [1, 2]);
    }

    #[test]
    fn peeled_graph_is_acyclic() {
        let mut g = graph_from(&[
            ("a#1", &[1, 2, 3]),
            ("a#2", &[2, 3, 4]),
            ("a#3", &[3, 4, 5]),
            ("b#1", &[1, 5, 6]),
        ]);
        merge_same_checksums(&mut g, true);
        peel(&mut g);
        g.dbg_check();
        g.check_single_owners().unwrap();
        let deps = DepGraph::from_graph(&g);
        deps.topological_ranks(&g).unwrap();
    }

    #[test]
    fn undefined_when_everything_is_shared() {
        let mut g = graph_from(&[("a#1", &[1, 2]), ("a#2", &[1, 2, 3]), ("b#1", &[1, 2, 4])]);
        let report = peel(&mut g);
        g.check_single_owners().unwrap();
        assert_eq!(report.undefined + report.defined, 3);
        assert_eq!(report.order.len(), 3);
    }
}
