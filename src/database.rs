//! The compact lookup database produced from a [`Solution`].
//!
//! App-version ids are dense indexes over the *defined* app-versions, in identity order.
//! References to undefined app-versions (in `implies` or `depends_on`) are dropped since those
//! app-versions can never be detected.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Checksum, DbId, SingleAppVersion, Solution};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AppVersionRecord {
    /// One entry for a single app-version, several for a merged one.
    pub identity: Vec<SingleAppVersion>,
    /// App-versions whose files are all contained in this one.
    pub implies: Vec<DbId>,
    /// Number of defining checksums stored for this app-version.
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChecksumRecord {
    pub checksum: Checksum,
    /// The app-version this checksum proves.
    pub app_version: DbId,
    /// If any of these app-versions is detected, this checksum proves nothing.
    pub depends_on: Vec<DbId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Database {
    /// Indexed by [`DbId`].
    pub app_versions: Vec<AppVersionRecord>,
    /// Sorted by checksum.
    pub checksums: Vec<ChecksumRecord>,
}

impl Database {
    pub fn from_solution(solution: &Solution) -> Self {
        let graph = &solution.graph;
        let max = solution.options.max_checksums;

        let mut db_ids: Vec<Option<DbId>> = vec![None; graph.app_version_arena_len()];
        for (id, &av) in solution.defined.iter().enumerate() {
            db_ids[av] = Some(id as DbId);
        }
        let map_ids = |avs: &mut dyn Iterator<Item=usize>| -> Vec<DbId> {
            let mut ids: Vec<DbId> = avs.filter_map(|av| db_ids[av]).collect();
            ids.sort_unstable();
            ids
        };

        let mut app_versions = Vec::with_capacity(solution.defined.len());
        let mut checksums = Vec::new();
        for (id, &av) in solution.defined.iter().enumerate() {
            let entry = graph.av(av);

            // Prefer checksums with fewer dependents. They are less likely to go stale as the
            // corpus grows.
            let mut chosen: Vec<usize> = entry.checksums.iter().copied().collect();
            chosen.sort_by_key(|&cs| (graph.cs(cs).depends_on.len(), graph.cs(cs).key));
            chosen.truncate(max);

            for &cs in chosen.iter() {
                let cs = graph.cs(cs);
                checksums.push(ChecksumRecord {
                    checksum: cs.key,
                    app_version: id as DbId,
                    depends_on: map_ids(&mut cs.depends_on.iter()),
                });
            }

            app_versions.push(AppVersionRecord {
                identity: entry.key.singles().to_vec(),
                implies: map_ids(&mut entry.implies.iter()),
                total: chosen.len() as u32,
            });
        }
        checksums.sort_unstable_by(|a, b| a.checksum.cmp(&b.checksum));

        info!(app_versions = app_versions.len(), checksums = checksums.len(), "database built");
        Self { app_versions, checksums }
    }

    pub fn lookup(&self, checksum: &Checksum) -> Option<&ChecksumRecord> {
        self.checksums.binary_search_by(|r| r.checksum.cmp(checksum))
            .ok()
            .map(|idx| &self.checksums[idx])
    }

    pub fn app_version(&self, id: DbId) -> Option<&AppVersionRecord> {
        self.app_versions.get(id as usize)
    }

    /// Human readable name of an app-version, like `wordpress#5.0` or `[a#1, b#1]`.
    pub fn name(&self, id: DbId) -> String {
        match self.app_version(id) {
            Some(r) if r.identity.len() == 1 => r.identity[0].to_string(),
            Some(r) => {
                let names: Vec<String> = r.identity.iter().map(|s| s.to_string()).collect();
                format!("[{}]", names.join(", "))
            }
            None => format!("#{id}"),
        }
    }
}

impl Solution {
    pub fn database(&self) -> Database {
        Database::from_solution(self)
    }
}
