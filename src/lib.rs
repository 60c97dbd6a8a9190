//! This crate builds a compact offline database which maps file checksums back to the application
//! versions which shipped them. Given a corpus of `(application, version, checksum)` triples from
//! known software releases, it decides for every checksum which single app-version that checksum
//! is allowed to *prove*, so a lightweight client can look at the set of checksums on a machine and
//! report which app-versions are installed.
//!
//! The engine is a bipartite graph between checksums and app-versions, and a handful of passes
//! which mutate it in place:
//!
//! 1. The [graph builder](graph::GraphBuilder) cross-links every checksum with the app-versions
//!    which contain it.
//! 2. The [merge pass](merge::merge_same_checksums) collapses app-versions with identical file sets.
//!    They're indistinguishable, and letting them compete would starve both.
//! 3. The [inclusion pass](inclusion::find_inclusions) records which app-versions are subsets of
//!    other app-versions (the *implies* relation).
//! 4. The [peeling solver](peel::peel) greedily partitions each app-version's checksums into the
//!    ones it keeps (its *defining* checksums) and the ones it releases. A released checksum
//!    *depends on* the app-versions which released it.
//! 5. The [checksum balancer](balance::ChecksumBalancer) moves released checksums back to starved
//!    app-versions while keeping the dependency graph between app-versions acyclic.
//!
//! [`build_solution`] runs the whole thing:
//!
//! ```
//! use webdetect::{build_solution, BuildOptions, Corpus};
//!
//! let mut corpus = Corpus::new();
//! let cs = |n: u8| webdetect::Checksum::from_bytes([n; 32]);
//! for n in 1..=3 { corpus.add("wordpress", "5.0", cs(n)); }
//! for n in 1..=6 { corpus.add("wordpress", "5.1", cs(n)); }
//!
//! let solution = build_solution(&corpus, &BuildOptions::default()).unwrap();
//! let db = solution.database();
//! assert_eq!(db.app_versions.len(), 2);
//! ```
//!
//! ## Depends-on and implies
//!
//! Consider two versions of the same application:
//!
//! ```text
//! version 1: [c1, c2, c3]
//! version 2: [c1, c2, c3, c4, c5, c6]
//! ```
//!
//! Version 2 is defined by `[c4, c5, c6]` since nothing else contains them. Version 2 releases
//! `[c1, c2, c3]`, which leaves version 1 as their sole owner. Those checksums now *depend on*
//! version 2: if a client sees all six files, version 1 is explained away by version 2 and only
//! version 2 is reported. If the client only sees `[c1, c2, c3]`, version 2 isn't present so
//! version 1 is reported.
//!
//! The dependency relation lifts to a directed graph between app-versions. That graph must stay
//! acyclic - otherwise the client's "is this version really present, or only present because of
//! X" question has no answer. Every pass which mutates ownership maintains this, and the
//! [consistency oracle](balance::ChecksumBalancer::verify) re-derives it from scratch.
//!
//! ## Errors
//!
//! Bad input (a malformed corpus row, a checksum naming an app-version which was never declared)
//! is reported as [`ParseError`] or [`BuildError`]. Anything else which goes wrong is an
//! [`InvariantViolation`] - a bug in the incremental bookkeeping. Those are never recovered from.
//! Callers should abort the build rather than write out a database built from a corrupt graph.

#![allow(clippy::module_inception)]

pub mod checksum;
pub mod appversion;
mod idxset;
pub mod intern;
pub mod corpus;
mod error;
pub mod graph;
pub mod merge;
pub mod inclusion;
pub mod pq;
pub mod peel;
pub mod balance;
mod options;
pub mod solution;
pub mod stats;
pub mod database;
pub mod client;

#[cfg(any(test, feature = "gen_test_data"))]
pub mod gen_random;

#[cfg(test)]
mod fuzzer;

pub use crate::appversion::{AppVersion, SingleAppVersion};
pub use crate::checksum::Checksum;
pub use crate::client::{Detection, Detector};
pub use crate::corpus::Corpus;
pub use crate::database::{AppVersionRecord, ChecksumRecord, Database};
pub use crate::error::{BuildError, Error, InvariantViolation, ParseError};
pub use crate::graph::{AppVersionEntry, ChecksumEntry, Graph, GraphBuilder};
pub use crate::idxset::IdxSet;
pub use crate::intern::Interner;
pub use crate::options::{BuildOptions, DetectOptions};
pub use crate::solution::{build_solution, Solution};

/// Index of an [`AppVersionEntry`] in the graph's app-version arena.
pub type AvIdx = usize;

/// Index of a [`ChecksumEntry`] in the graph's checksum arena.
pub type CsIdx = usize;

/// The app-version ids used in the produced [`Database`]. These are dense over the *defined*
/// app-versions only, and unrelated to [`AvIdx`].
pub type DbId = u32;
