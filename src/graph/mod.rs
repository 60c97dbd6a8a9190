//! The bipartite graph between checksums and app-versions.
//!
//! Both sides live in arenas (`Vec`s) and refer to each other by index. Each link is stored in
//! both directions:
//!
//! - [`ChecksumEntry::app_versions`] / [`AppVersionEntry::checksums`] is the *owns* relation. An
//!   app-version owns a checksum until it releases it.
//! - [`ChecksumEntry::depends_on`] / [`AppVersionEntry::released`] is the *released* relation.
//!
//! Every app-version which contains a file is in exactly one of those two relations with that
//! file's checksum, at all times.

mod builder;
mod check;
pub mod deps;
#[cfg(feature = "dot_export")]
mod dot;

use std::collections::{BTreeSet, HashMap};

pub use builder::GraphBuilder;
pub use deps::DepGraph;

use crate::{AppVersion, AvIdx, Checksum, CsIdx, IdxSet};

/// An app-version node in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppVersionEntry {
    pub key: AppVersion,

    /// The checksums this app-version currently owns. After peeling, these are the checksums which
    /// define (discriminate) this app-version.
    pub checksums: BTreeSet<CsIdx>,

    /// Checksums this app-version has given up.
    pub released: BTreeSet<CsIdx>,

    /// App-versions whose full (pre-peeling) checksum set is a subset of this one's. Filled in once
    /// by the inclusion pass.
    pub implies: IdxSet,

    /// False once the merge pass has folded this entry into a merged entry. Dead entries hold no
    /// links and are skipped by every pass.
    live: bool,
}

impl AppVersionEntry {
    pub(crate) fn new(key: AppVersion) -> Self {
        Self {
            key,
            checksums: BTreeSet::new(),
            released: BTreeSet::new(),
            implies: IdxSet::new(),
            live: true,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// An app-version is defined once peeling leaves it with at least one checksum of its own.
    pub fn is_defined(&self) -> bool {
        self.live && !self.checksums.is_empty()
    }
}

/// A checksum node in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub key: Checksum,

    /// App-versions which still own this checksum.
    pub app_versions: IdxSet,

    /// App-versions which have released this checksum. If any of these is detected on a client,
    /// this checksum says nothing about its owner.
    pub depends_on: IdxSet,
}

impl ChecksumEntry {
    pub(crate) fn new(key: Checksum) -> Self {
        Self { key, app_versions: IdxSet::new(), depends_on: IdxSet::new() }
    }

    /// The sole owner of this checksum, if there is exactly one.
    pub fn owner(&self) -> Option<AvIdx> {
        self.app_versions.single()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(crate) app_versions: Vec<AppVersionEntry>,
    pub(crate) checksums: Vec<ChecksumEntry>,

    av_by_key: HashMap<AppVersion, AvIdx>,
    cs_by_key: HashMap<Checksum, CsIdx>,

    /// Number of checksums the builder dropped because too many applications share them.
    pub(crate) num_filtered_checksums: usize,
}

impl Graph {
    pub fn av(&self, idx: AvIdx) -> &AppVersionEntry {
        &self.app_versions[idx]
    }

    pub fn cs(&self, idx: CsIdx) -> &ChecksumEntry {
        &self.checksums[idx]
    }

    pub fn find_app_version(&self, key: &AppVersion) -> Option<AvIdx> {
        self.av_by_key.get(key).copied()
    }

    pub fn find_checksum(&self, key: &Checksum) -> Option<CsIdx> {
        self.cs_by_key.get(key).copied()
    }

    /// Indexes of every app-version entry which hasn't been merged away, in index order.
    pub fn live_app_versions(&self) -> impl Iterator<Item=AvIdx> + '_ {
        self.app_versions.iter()
            .enumerate()
            .filter_map(|(i, av)| if av.live { Some(i) } else { None })
    }

    /// Number of live app-version entries.
    pub fn num_app_versions(&self) -> usize {
        self.av_by_key.len()
    }

    /// Size of the app-version arena, including dead entries.
    pub fn app_version_arena_len(&self) -> usize {
        self.app_versions.len()
    }

    pub fn num_checksums(&self) -> usize {
        self.checksums.len()
    }

    pub fn num_filtered_checksums(&self) -> usize {
        self.num_filtered_checksums
    }

    pub(crate) fn push_app_version(&mut self, entry: AppVersionEntry) -> AvIdx {
        let idx = self.app_versions.len();
        self.av_by_key.insert(entry.key.clone(), idx);
        self.app_versions.push(entry);
        idx
    }

    pub(crate) fn push_checksum(&mut self, entry: ChecksumEntry) -> CsIdx {
        let idx = self.checksums.len();
        self.cs_by_key.insert(entry.key, idx);
        self.checksums.push(entry);
        idx
    }

    /// Mark an entry as merged away. The caller must already have moved its links elsewhere.
    pub(crate) fn kill_app_version(&mut self, idx: AvIdx) {
        let entry = &mut self.app_versions[idx];
        debug_assert!(entry.checksums.is_empty() && entry.released.is_empty());
        entry.live = false;
        entry.implies.clear();
        // A merged identity can collapse back to one of its members (see merge::exclude_trunk).
        // Only drop the mapping if it still points here.
        if self.av_by_key.get(&entry.key) == Some(&idx) {
            self.av_by_key.remove(&entry.key);
        }
    }

    /// `av` gives up ownership of `cs`. The checksum now depends on `av`.
    pub(crate) fn release(&mut self, av: AvIdx, cs: CsIdx) {
        let a = &mut self.app_versions[av];
        let removed = a.checksums.remove(&cs);
        debug_assert!(removed);
        a.released.insert(cs);

        let c = &mut self.checksums[cs];
        c.app_versions.remove(av);
        c.depends_on.insert(av);
    }

    /// Move ownership of `cs` from `from` to `to`, where `to` previously released it. Afterwards
    /// the checksum depends on `from` instead of `to`.
    pub(crate) fn transfer(&mut self, from: AvIdx, to: AvIdx, cs: CsIdx) {
        let c = &mut self.checksums[cs];
        debug_assert!(c.app_versions.contains(from) && c.depends_on.contains(to));
        c.depends_on.insert(from);
        c.depends_on.remove(to);
        c.app_versions.insert(to);
        c.app_versions.remove(from);

        let f = &mut self.app_versions[from];
        f.released.insert(cs);
        f.checksums.remove(&cs);

        let t = &mut self.app_versions[to];
        t.checksums.insert(cs);
        t.released.remove(&cs);
    }

    /// Rough estimate of the memory held by the graph, for statistics.
    pub fn estimated_heap_size(&self) -> usize {
        use std::mem::size_of;
        // BTreeSet nodes carry some overhead per item. 2x is close enough for a report.
        let av_bytes: usize = self.app_versions.iter().map(|av| {
            size_of::<AppVersionEntry>()
                + 2 * size_of::<CsIdx>() * (av.checksums.len() + av.released.len())
                + if av.implies.len() > 2 { av.implies.len() * size_of::<AvIdx>() } else { 0 }
        }).sum();
        let cs_bytes: usize = self.checksums.iter().map(|cs| {
            size_of::<ChecksumEntry>()
                + if cs.app_versions.len() > 2 { cs.app_versions.len() * size_of::<AvIdx>() } else { 0 }
                + if cs.depends_on.len() > 2 { cs.depends_on.len() * size_of::<AvIdx>() } else { 0 }
        }).sum();
        av_bytes + cs_bytes
            + (self.av_by_key.capacity() + self.cs_by_key.capacity()) * 2 * size_of::<usize>()
    }
}
