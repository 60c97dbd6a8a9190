use std::io;

use thiserror::Error;

use crate::{AppVersion, Checksum};

/// A row of the input corpus couldn't be understood. Line numbers are 1-based.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ParseError {
    #[error("line {line}: expected 3 to 5 tab separated columns, found {columns}")]
    InvalidRow { line: usize, columns: usize },

    #[error("line {line}: invalid checksum {value:?}: expected 64 hex characters")]
    InvalidChecksum { line: usize, value: String },

    #[error("invalid checksum {0:?}: expected 64 hex characters")]
    InvalidHex(String),

    #[error("corpus read failed: {0}")]
    Io(#[from] io::Error),
}

/// The graph builder was handed data which doesn't describe a consistent corpus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BuildError {
    #[error("checksum {checksum} references app-version {app_version} which was never declared")]
    UnknownAppVersion { checksum: Checksum, app_version: AppVersion },

    #[error("checksum {0} is not contained in any app-version")]
    EmptyChecksum(Checksum),

    #[error("checksum {0} was supplied more than once")]
    DuplicateChecksum(Checksum),

    #[error("app-version {0} was declared more than once")]
    DuplicateAppVersion(AppVersion),
}

/// The in-memory graph no longer satisfies one of its structural invariants.
///
/// This always indicates a bug in the passes which mutate the graph, never bad input. It is fatal:
/// a database built from the graph can't be trusted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvariantViolation {
    #[error("checksum {checksum} and app-version {app_version} are not linked in both directions")]
    BrokenLink { checksum: Checksum, app_version: AppVersion },

    #[error("checksum {checksum} is both owned and released by {app_version}")]
    OwnedAndReleased { checksum: Checksum, app_version: AppVersion },

    #[error("checksum {checksum} has {owners} owners, expected exactly one")]
    NotSingleOwner { checksum: Checksum, owners: usize },

    #[error("removed app-version entry {0} still holds checksums")]
    DeadEntryLinked(AppVersion),

    #[error("incrementally maintained dependency graph differs from the recomputed one at {0}")]
    GraphMismatch(AppVersion),

    #[error("incrementally maintained inverse dependency graph differs from the recomputed one at {0}")]
    InverseGraphMismatch(AppVersion),

    #[error("topological ranks out of order on edge {from} -> {to}")]
    RankOrder { from: AppVersion, to: AppVersion },

    #[error("dependency graph has a cycle through {from} -> {to}")]
    Cycle { from: AppVersion, to: AppVersion },
}

/// Crate-level convenience error. A thin wrapper over the error kinds above.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("internal invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl Error {
    /// Invariant violations are bugs. Tooling should abort the whole build on these rather than
    /// emit a database.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::Invariant(_))
    }
}
