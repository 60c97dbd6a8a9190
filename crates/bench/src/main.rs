// Benchmarks over randomly generated corpora. See webdetect::gen_random for what those look like.

use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use webdetect::balance::balance;
use webdetect::gen_random::gen_corpus;
use webdetect::inclusion::find_inclusions;
use webdetect::merge::merge_same_checksums;
use webdetect::peel::peel;
use webdetect::{build_solution, BuildOptions, Checksum, Corpus, DetectOptions, Detector, Graph, GraphBuilder};

const SIZES: &[usize] = &[50, 300, 2000];

fn corpus(apps: usize) -> Corpus {
    gen_corpus(apps as u64, apps)
}

/// A merged graph with implications found, ready for peeling.
fn prepared_graph(corpus: &Corpus) -> Graph {
    let mut graph = GraphBuilder::from_corpus(corpus, Some(10)).unwrap();
    merge_same_checksums(&mut graph, true);
    find_inclusions(&mut graph);
    graph
}

fn build_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for &apps in SIZES {
        let corpus = corpus(apps);
        group.throughput(Throughput::Elements(corpus.num_associations() as u64));

        group.bench_function(BenchmarkId::new("graph", apps), |b| {
            b.iter(|| {
                let graph = GraphBuilder::from_corpus(&corpus, Some(10)).unwrap();
                black_box(graph.num_checksums());
            })
        });

        group.bench_function(BenchmarkId::new("solution", apps), |b| {
            b.iter(|| {
                let solution = build_solution(&corpus, &BuildOptions::default()).unwrap();
                black_box(solution.defined().len());
            })
        });

        // Without the consistency checks, which recompute the dependency graph from scratch.
        let unverified = BuildOptions { verify: false, ..BuildOptions::default() };
        group.bench_function(BenchmarkId::new("solution_unverified", apps), |b| {
            b.iter(|| {
                let solution = build_solution(&corpus, &unverified).unwrap();
                black_box(solution.defined().len());
            })
        });
    }
    group.finish();
}

fn pass_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("passes");
    for &apps in SIZES {
        let corpus = corpus(apps);
        let prepared = prepared_graph(&corpus);

        group.bench_function(BenchmarkId::new("peel", apps), |b| {
            b.iter(|| {
                let mut graph = prepared.clone();
                let report = peel(&mut graph);
                black_box(report.defined);
            })
        });

        let mut peeled = prepared.clone();
        peel(&mut peeled);
        group.bench_function(BenchmarkId::new("balance", apps), |b| {
            b.iter(|| {
                let mut graph = peeled.clone();
                let report = balance(&mut graph, 5, 200, false).unwrap();
                black_box(report.transfers);
            })
        });
    }
    group.finish();
}

fn detect_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect");
    for &apps in SIZES {
        let corpus = corpus(apps);
        let db = build_solution(&corpus, &BuildOptions::default()).unwrap().database();
        let detector = Detector::new(&db, DetectOptions::default());

        // Every stored checksum of every third app-version, as if they were all installed.
        let observed: Vec<Checksum> = db.checksums.iter()
            .filter(|r| r.app_version % 3 == 0)
            .map(|r| r.checksum)
            .collect();
        group.throughput(Throughput::Elements(observed.len() as u64));

        group.bench_function(BenchmarkId::new("detect", apps), |b| {
            b.iter(|| {
                let d = detector.detect(&observed);
                black_box(d.detected.len());
            })
        });
    }
    group.finish();
}

fn main() {
    let mut c = Criterion::default()
        .configure_from_args();

    build_benchmarks(&mut c);
    pass_benchmarks(&mut c);
    detect_benchmarks(&mut c);
    c.final_summary();
}
