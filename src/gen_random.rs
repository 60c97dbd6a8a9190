//! Random corpus generation, for the fuzzer, the benchmarks and `webdetect gen-corpus`.
//!
//! Generated corpora look vaguely like real ones: applications release a series of versions, each
//! a mutation of the last, so versions overlap heavily and some are strict subsets of others. Some
//! versions are re-released unchanged (or shipped again as `trunk`), some applications vendor a
//! shared library, and a few files (think empty `index.html`) appear in every application.

use std::io::{self, Write};

use rand::prelude::*;

use crate::appversion::TRUNK;
use crate::{Checksum, Corpus};

/// One `(app, version, checksum)` corpus row.
pub type Row = (String, String, Checksum);

fn random_checksum(rng: &mut SmallRng) -> Checksum {
    Checksum::from_bytes(rng.gen())
}

/// Generate corpus rows for `apps` applications.
pub fn gen_rows(seed: u64, apps: usize) -> Vec<Row> {
    let mut rng = SmallRng::seed_from_u64(seed);

    let everywhere: Vec<Checksum> = (0..3).map(|_| random_checksum(&mut rng)).collect();
    let libraries: Vec<Vec<Checksum>> = (0..3)
        .map(|_| (0..rng.gen_range(2..8)).map(|_| random_checksum(&mut rng)).collect())
        .collect();

    let mut rows = Vec::new();
    for a in 0..apps {
        let app = format!("app{a}");
        let mut files: Vec<Checksum> = (0..rng.gen_range(2..12)).map(|_| random_checksum(&mut rng)).collect();
        files.push(everywhere[rng.gen_range(0..everywhere.len())]);
        if rng.gen_bool(0.3) {
            if let Some(lib) = libraries.choose(&mut rng) {
                files.extend_from_slice(lib);
            }
        }

        let num_versions = rng.gen_range(1..8);
        for v in 0..num_versions {
            let version = format!("1.{v}");
            rows.extend(files.iter().map(|&cs| (app.clone(), version.clone(), cs)));

            // An unchanged re-release.
            if rng.gen_bool(0.1) {
                let version = format!("1.{v}.1");
                rows.extend(files.iter().map(|&cs| (app.clone(), version.clone(), cs)));
            }

            if v + 1 == num_versions {
                if rng.gen_bool(0.3) {
                    rows.extend(files.iter().map(|&cs| (app.clone(), TRUNK.to_string(), cs)));
                }
                break;
            }

            // Mutate for the next version. Sometimes the next version only adds files, which makes
            // this version a strict subset of it.
            if rng.gen_bool(0.6) {
                for _ in 0..rng.gen_range(0..3) {
                    if files.len() > 1 {
                        let i = rng.gen_range(0..files.len());
                        files.swap_remove(i);
                    }
                }
            }
            for _ in 0..rng.gen_range(0..4) {
                files.push(random_checksum(&mut rng));
            }
        }
    }

    rows
}

pub fn gen_corpus(seed: u64, apps: usize) -> Corpus {
    let mut corpus = Corpus::new();
    for (app, version, checksum) in gen_rows(seed, apps) {
        corpus.add(&app, &version, checksum);
    }
    corpus
}

/// Write rows in the TSV format [`Corpus::read_tsv`] reads. The depth column is always 1.
pub fn write_tsv<W: Write>(rows: &[Row], mut writer: W) -> io::Result<()> {
    for (app, version, checksum) in rows {
        writeln!(writer, "{app}\t{version}\t{checksum}\t1")?;
    }
    writer.flush()
}
