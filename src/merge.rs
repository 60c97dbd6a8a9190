//! The version-merge pass.
//!
//! App-versions which contain exactly the same set of files can't be told apart by any checksum.
//! If they were left as separate entries they'd compete for the same checksums during peeling and
//! both would end up undefined. So before anything else, each group of them is collapsed into one
//! entry with a [merged identity](AppVersion::Merged).

use std::collections::{BTreeSet, HashMap};
use std::mem::take;

use tracing::{debug, info};

use crate::graph::{AppVersionEntry, Graph};
use crate::{AppVersion, AvIdx, CsIdx, IdxSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergeReport {
    /// Number of merged entries created.
    pub groups: usize,
    /// Number of entries folded into those.
    pub merged_app_versions: usize,
}

/// Pick the identities to keep for a merged group.
///
/// A development snapshot (version `trunk`) with the same files as a release of the same
/// application is just that release. If every member belongs to one application, trunk members are
/// dropped. Members of different applications are always kept.
fn exclude_trunk(keys: Vec<AppVersion>) -> Vec<AppVersion> {
    let first_app = keys.first().and_then(|k| k.apps().next());
    let one_app = keys.iter().flat_map(|k| k.apps()).all(|app| Some(app) == first_app);
    if !one_app { return keys; }

    let is_trunk = |k: &AppVersion| k.singles().iter().all(|s| s.is_trunk());
    if keys.iter().all(is_trunk) { return keys; }
    keys.into_iter().filter(|k| !is_trunk(k)).collect()
}

/// Collapse every group of live app-versions which own exactly the same non-empty set of
/// checksums into a single entry. Running this a second time is a no-op.
pub fn merge_same_checksums(graph: &mut Graph, exclude_trunk_versions: bool) -> MergeReport {
    info!("merging app-versions with identical checksum sets");

    let mut groups: HashMap<&BTreeSet<CsIdx>, Vec<AvIdx>> = HashMap::new();
    for idx in graph.live_app_versions() {
        let checksums = &graph.av(idx).checksums;
        if checksums.is_empty() { continue; }
        groups.entry(checksums).or_default().push(idx);
    }

    let mut groups: Vec<Vec<AvIdx>> = groups.into_values()
        .filter(|members| members.len() > 1)
        .collect();
    // Members are already ascending. Process groups in order of their first member.
    groups.sort_unstable_by_key(|members| members[0]);

    let mut report = MergeReport::default();
    for members in groups {
        let merged = merge_group(graph, &members, exclude_trunk_versions);
        debug!(members = members.len(), identity = %graph.av(merged).key, "merged app-versions");
        report.groups += 1;
        report.merged_app_versions += members.len();
    }

    info!(groups = report.groups, app_versions = report.merged_app_versions, "merge done");
    report
}

fn merge_group(graph: &mut Graph, members: &[AvIdx], exclude_trunk_versions: bool) -> AvIdx {
    let mut keys = Vec::with_capacity(members.len());
    let mut checksums = BTreeSet::new();
    let mut released = BTreeSet::new();
    let mut implies = IdxSet::new();

    for &idx in members {
        let entry = &mut graph.app_versions[idx];
        keys.push(entry.key.clone());
        // All members own the same set.
        checksums = take(&mut entry.checksums);
        released.append(&mut take(&mut entry.released));
        implies.extend(entry.implies.iter());
        graph.kill_app_version(idx);
    }

    if exclude_trunk_versions {
        keys = exclude_trunk(keys);
    }
    let mut entry = AppVersionEntry::new(AppVersion::merged(keys));
    entry.checksums = checksums;
    entry.released = released;
    for &m in members { implies.remove(m); }
    entry.implies = implies;
    let merged = graph.push_app_version(entry);

    let repoint = |set: &mut IdxSet| {
        for &m in members { set.remove(m); }
        set.insert(merged);
    };
    let Graph { app_versions, checksums, .. } = graph;
    let entry = &app_versions[merged];
    for &cs in entry.checksums.iter() {
        repoint(&mut checksums[cs].app_versions);
    }
    for &cs in entry.released.iter() {
        repoint(&mut checksums[cs].depends_on);
    }
    merged
}
