//! The inclusion-discovery pass.
//!
//! If every file of app-version A also ships in app-version B, peeling will eventually strip A's
//! checksums and make them depend on B. A client which sees B would then never report A, even
//! though A's files are all there. So before peeling we record `A ∈ B.implies`, and the client
//! uses that to recover A.

use tracing::info;

use crate::graph::Graph;
use crate::{AvIdx, IdxSet};

/// Fill in [`implies`](crate::AppVersionEntry::implies) for every live app-version. This must run
/// on the original ownership data, after merging and before peeling. Returns the number of
/// implication edges recorded.
pub fn find_inclusions(graph: &mut Graph) -> usize {
    info!("finding app-version inclusions");
    let mut found: Vec<(AvIdx, AvIdx)> = Vec::new();

    for a in graph.live_app_versions() {
        let checksums = &graph.av(a).checksums;

        // Start from the checksum with the fewest owners to keep the intersection small.
        let Some(&smallest) = checksums.iter()
            .min_by_key(|&&cs| graph.cs(cs).app_versions.len()) else { continue; };

        let mut supersets: IdxSet = graph.cs(smallest).app_versions.clone();
        for &cs in checksums.iter() {
            if supersets.len() <= 1 { break; }
            supersets.retain_in(&graph.cs(cs).app_versions);
        }

        for b in supersets.iter() {
            if b != a { found.push((b, a)); }
        }
    }

    let count = found.len();
    for (b, a) in found {
        graph.app_versions[b].implies.insert(a);
    }

    info!(implications = count, "inclusions done");
    count
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::test::{av, graph_from};
    use crate::merge::merge_same_checksums;

    #[test]
    fn subsets_are_implied() {
        let mut g = graph_from(&[
            ("wp#1", &[1, 2, 3]),
            ("wp#2", &[1, 2, 3, 4, 5, 6]),
            ("wp#3", &[1, 2, 3, 4, 5, 6, 7]),
            ("other#1", &[3, 9]),
        ]);
        merge_same_checksums(&mut g, true);
        assert_eq!(find_inclusions(&mut g), 3);
        g.dbg_check();

        let idx = |s: &str| g.find_app_version(&av(s)).unwrap();
        assert!(g.av(idx("wp#1")).implies.is_empty());
        assert_eq!(g.av(idx("wp#2")).implies.as_slice(), &[idx("wp#1")]);
        assert_eq!(g.av(idx("wp#3")).implies.as_slice(), &[idx("wp#1"), idx("wp#2")]);
        assert!(g.av(idx("other#1")).implies.is_empty());
    }

    #[test]
    fn partial_overlap_is_not_inclusion() {
        let mut g = graph_from(&[("a#1", &[1, 2]), ("a#2", &[2, 3])]);
        assert_eq!(find_inclusions(&mut g), 0);
    }
}
