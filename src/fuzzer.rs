use std::collections::BTreeSet;

use rand::prelude::*;

use crate::balance::ChecksumBalancer;
use crate::gen_random::gen_corpus;
use crate::graph::{DepGraph, Graph};
use crate::inclusion::find_inclusions;
use crate::merge::{merge_same_checksums, MergeReport};
use crate::peel::peel;
use crate::{build_solution, AvIdx, BuildOptions, Checksum, CsIdx, DetectOptions, Detector, GraphBuilder};

/// Every file each app-version contained, before any pass moved ownership around.
fn original_sets(graph: &Graph) -> Vec<BTreeSet<CsIdx>> {
    graph.app_versions.iter().map(|e| e.checksums.clone()).collect()
}

/// Each link is in exactly one of `checksums` and `released`.
fn check_coverage(graph: &Graph, original: &[BTreeSet<CsIdx>]) {
    for av in graph.live_app_versions() {
        let e = graph.av(av);
        assert!(e.checksums.is_disjoint(&e.released), "{} owns and released a checksum", e.key);
        let all: BTreeSet<CsIdx> = e.checksums.union(&e.released).copied().collect();
        assert_eq!(all, original[av], "{} lost a link", e.key);
    }
}

fn check_inclusions(graph: &Graph, original: &[BTreeSet<CsIdx>]) {
    let live: Vec<AvIdx> = graph.live_app_versions().collect();
    for &a in live.iter() {
        for &b in live.iter() {
            if a == b { continue; }
            let expected = !original[a].is_empty() && original[a].is_subset(&original[b]);
            assert_eq!(graph.av(b).implies.contains(a), expected,
                "implies({}, {}) should be {expected}", graph.av(b).key, graph.av(a).key);
        }
    }
}

/// Replay the peel visit order on the unpeeled graph. When an app-version is visited, every
/// checksum it ends up keeping must have no other owner left at that moment.
fn check_exclusive_when_visited(unpeeled: &Graph, peeled: &Graph, order: &[AvIdx]) {
    let mut replay = unpeeled.clone();
    for &av in order {
        for &cs in peeled.av(av).released.iter() {
            assert!(replay.cs(cs).app_versions.len() > 1,
                "{} released {} while owning it alone", peeled.av(av).key, replay.cs(cs).key);
            replay.release(av, cs);
        }
        for &cs in peeled.av(av).checksums.iter() {
            assert_eq!(replay.cs(cs).app_versions.as_slice(), [av],
                "{} kept {} while it had other owners", peeled.av(av).key, replay.cs(cs).key);
        }
        assert_eq!(replay.av(av).checksums, peeled.av(av).checksums);
    }
}

fn fuzz_solution(seed: u64, verbose: bool) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let apps = rng.gen_range(1..40);
    let max = rng.gen_range(1..8);
    let corpus = gen_corpus(seed, apps);
    if verbose { println!("seed {seed}: {apps} apps, {} checksums, max {max}", corpus.num_checksums()); }

    let mut graph = GraphBuilder::from_corpus(&corpus, Some(10)).unwrap();
    graph.dbg_check();

    merge_same_checksums(&mut graph, rng.gen_bool(0.5));
    graph.dbg_check();
    let merged = graph.clone();
    assert_eq!(merge_same_checksums(&mut graph, true), MergeReport::default());
    assert_eq!(merged.num_app_versions(), graph.num_app_versions());

    let original = original_sets(&graph);
    find_inclusions(&mut graph);
    check_inclusions(&graph, &original);

    let unpeeled = graph.clone();
    let report = peel(&mut graph);
    graph.dbg_check();
    graph.check_single_owners().unwrap();
    check_coverage(&graph, &original);
    assert_eq!(report.order.len(), graph.num_app_versions());
    assert_eq!(report.order.iter().collect::<BTreeSet<_>>().len(), report.order.len());
    check_exclusive_when_visited(&unpeeled, &graph, &report.order);
    DepGraph::from_graph(&graph).topological_ranks(&graph).unwrap();

    let peeled_sizes: Vec<usize> = graph.app_versions.iter().map(|e| e.checksums.len()).collect();
    let mut balancer = ChecksumBalancer::new(&mut graph, max).unwrap();
    for _ in 0..200 {
        let r = balancer.run(1).unwrap();
        balancer.dbg_check();
        if r.converged { break; }
    }
    if verbose { println!("{:?}", balancer.report()); }
    drop(balancer);

    check_coverage(&graph, &original);
    for av in graph.live_app_versions() {
        let now = graph.av(av).checksums.len();
        // Only donors shrink, and a donor never drops below the target.
        if now < peeled_sizes[av] {
            assert!(now >= max, "{} was drained to {now}", graph.av(av).key);
        }
        // Receiving never takes a defined app-version's checksums away entirely.
        if peeled_sizes[av] > 0 { assert!(now > 0); }
    }
}

/// Observing exactly the stored checksums of one app-version always detects it.
fn fuzz_detection(seed: u64, verbose: bool) {
    let corpus = gen_corpus(seed, 25);
    let solution = build_solution(&corpus, &BuildOptions::default()).unwrap();
    let db = solution.database();
    let detector = Detector::new(&db, DetectOptions::default());
    if verbose { println!("seed {seed}: {} app-versions in the database", db.app_versions.len()); }

    for id in 0..db.app_versions.len() as u32 {
        let observed: Vec<Checksum> = db.checksums.iter()
            .filter(|r| r.app_version == id)
            .map(|r| r.checksum)
            .collect();
        let d = detector.detect(&observed);
        assert_eq!(d.detected, [id], "{} was not detected from its own files", db.name(id));
        assert!(d.filtered_by_fraction.is_empty());
        assert!(d.filtered_by_depends_on.is_empty());
    }
}

#[test]
fn fuzz_once() {
    fuzz_solution(123, true);
}

#[test]
fn fuzz() {
    for seed in 0..60 {
        fuzz_solution(seed, false);
    }
}

#[test]
fn fuzz_detection_once() {
    fuzz_detection(7, true);
}

#[test]
fn fuzz_detections() {
    for seed in 0..20 {
        fuzz_detection(seed, false);
    }
}

#[test]
#[ignore]
fn fuzz_forever() {
    for seed in 0.. {
        if seed % 100 == 0 { println!("seed {seed}"); }
        fuzz_solution(seed, false);
        fuzz_detection(seed, false);
    }
}
