use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;
use tracing::info;

use crate::{AppVersion, BuildError, Checksum, Corpus, IdxSet};
use crate::graph::{AppVersionEntry, ChecksumEntry, Graph};

/// Constructs a [`Graph`] from raw checksum -> app-version associations.
///
/// App-versions must be declared before any checksum refers to them. Whatever order things are
/// added in, the built graph indexes app-versions in identity order and checksums in hash order.
/// Every later pass iterates in index order, so this pins down the result of the whole build.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    app_versions: Vec<AppVersion>,
    av_ids: HashMap<AppVersion, usize>,

    /// Values index into app_versions.
    checksums: Vec<(Checksum, IdxSet)>,
    seen: HashSet<Checksum>,

    max_apps_per_checksum: Option<usize>,
    num_filtered: usize,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop checksums shared by more than `max` distinct applications. Those are things like
    /// empty files or common license texts. They can't discriminate anything, and they make the
    /// peeling pass slow.
    pub fn with_max_apps_per_checksum(mut self, max: Option<usize>) -> Self {
        self.max_apps_per_checksum = max;
        self
    }

    pub fn declare(&mut self, key: AppVersion) -> Result<(), BuildError> {
        if self.av_ids.contains_key(&key) {
            return Err(BuildError::DuplicateAppVersion(key));
        }
        self.av_ids.insert(key.clone(), self.app_versions.len());
        self.app_versions.push(key);
        Ok(())
    }

    /// Add a checksum and the set of app-versions observed to contain it. Every app-version must
    /// already have been declared, the set must not be empty, and each checksum may only be added
    /// once.
    ///
    /// Returns false if the checksum was dropped by the shared-checksum filter.
    pub fn add_checksum<'a, I>(&mut self, checksum: Checksum, app_versions: I) -> Result<bool, BuildError>
        where I: IntoIterator<Item=&'a AppVersion>
    {
        if !self.seen.insert(checksum) {
            return Err(BuildError::DuplicateChecksum(checksum));
        }

        let mut ids = IdxSet::new();
        for key in app_versions {
            let id = *self.av_ids.get(key).ok_or_else(|| BuildError::UnknownAppVersion {
                checksum,
                app_version: key.clone(),
            })?;
            ids.insert(id);
        }
        if ids.is_empty() {
            return Err(BuildError::EmptyChecksum(checksum));
        }

        if let Some(max) = self.max_apps_per_checksum {
            let mut apps: SmallVec<[&str; 8]> = ids.iter()
                .flat_map(|id| self.app_versions[id].apps())
                .collect();
            apps.sort_unstable();
            apps.dedup();
            if apps.len() > max {
                self.num_filtered += 1;
                return Ok(false);
            }
        }

        self.checksums.push((checksum, ids));
        Ok(true)
    }

    /// Load everything from a corpus.
    pub fn add_corpus(&mut self, corpus: &Corpus) -> Result<(), BuildError> {
        let base = self.app_versions.len();
        for single in corpus.app_versions() {
            self.declare(single.clone().into())?;
        }

        for (checksum, ids) in corpus.checksums() {
            let keys: SmallVec<[AppVersion; 2]> = ids.iter()
                .map(|id| self.app_versions[base + id].clone())
                .collect();
            self.add_checksum(*checksum, keys.iter())?;
        }
        Ok(())
    }

    pub fn from_corpus(corpus: &Corpus, max_apps_per_checksum: Option<usize>) -> Result<Graph, BuildError> {
        let mut builder = Self::new().with_max_apps_per_checksum(max_apps_per_checksum);
        builder.add_corpus(corpus)?;
        Ok(builder.build())
    }

    pub fn build(self) -> Graph {
        let GraphBuilder { app_versions, mut checksums, num_filtered, .. } = self;

        // Reindex app-versions into identity order.
        let mut order: Vec<usize> = (0..app_versions.len()).collect();
        order.sort_unstable_by(|a, b| app_versions[*a].cmp(&app_versions[*b]));
        let mut new_idx = vec![0; app_versions.len()];
        for (new, &old) in order.iter().enumerate() {
            new_idx[old] = new;
        }

        let mut graph = Graph {
            app_versions: Vec::with_capacity(app_versions.len()),
            checksums: Vec::with_capacity(checksums.len()),
            num_filtered_checksums: num_filtered,
            ..Graph::default()
        };

        let mut keys: Vec<Option<AppVersion>> = app_versions.into_iter().map(Some).collect();
        for &old in &order {
            // Each old index appears exactly once in order.
            if let Some(key) = keys[old].take() {
                graph.push_app_version(AppVersionEntry::new(key));
            }
        }

        checksums.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        for (checksum, ids) in checksums {
            let mut entry = ChecksumEntry::new(checksum);
            entry.app_versions = ids.iter().map(|old| new_idx[old]).collect();
            let cs_idx = graph.push_checksum(entry);
            for av in graph.checksums[cs_idx].app_versions.iter() {
                graph.app_versions[av].checksums.insert(cs_idx);
            }
        }

        info!(
            app_versions = graph.num_app_versions(),
            checksums = graph.num_checksums(),
            filtered = num_filtered,
            "graph built"
        );
        graph
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::test::{av, cs, graph_from, try_graph_from};

    #[test]
    fn links_both_ways_in_canonical_order() {
        let g = graph_from(&[
            ("z#1", &[3, 1]),
            ("a#1", &[1, 2]),
        ]);
        g.dbg_check();

        // App-versions are indexed in identity order, checksums in hash order.
        assert_eq!(g.av(0).key, av("a#1"));
        assert_eq!(g.av(1).key, av("z#1"));
        assert_eq!(g.cs(0).key, cs(1));
        assert_eq!(g.cs(2).key, cs(3));

        assert_eq!(g.cs(0).app_versions.as_slice(), &[0, 1]);
        assert_eq!(g.av(0).checksums.iter().copied().collect::<Vec<_>>(), [0, 1]);
        assert_eq!(g.av(1).checksums.iter().copied().collect::<Vec<_>>(), [0, 2]);
        assert!(g.cs(1).depends_on.is_empty());
    }

    #[test]
    fn unknown_app_version_is_an_error() {
        let mut b = GraphBuilder::new();
        b.declare(av("a#1")).unwrap();
        let err = b.add_checksum(cs(1), [av("a#1"), av("b#1")].iter()).unwrap_err();
        assert_eq!(err, BuildError::UnknownAppVersion { checksum: cs(1), app_version: av("b#1") });
    }

    #[test]
    fn checksum_without_app_versions_is_an_error() {
        let mut b = GraphBuilder::new();
        b.declare(av("a#1")).unwrap();
        assert_eq!(b.add_checksum(cs(1), std::iter::empty()), Err(BuildError::EmptyChecksum(cs(1))));

        b.add_checksum(cs(2), [av("a#1")].iter()).unwrap();
        let g = b.build();
        g.dbg_check();
        assert_eq!(g.num_checksums(), 1);
        assert!(g.find_checksum(&cs(1)).is_none());
    }

    #[test]
    fn duplicates_are_errors() {
        let mut b = GraphBuilder::new();
        b.declare(av("a#1")).unwrap();
        assert_eq!(b.declare(av("a#1")), Err(BuildError::DuplicateAppVersion(av("a#1"))));

        b.add_checksum(cs(1), [av("a#1")].iter()).unwrap();
        assert_eq!(b.add_checksum(cs(1), [av("a#1")].iter()), Err(BuildError::DuplicateChecksum(cs(1))));
    }

    #[test]
    fn widely_shared_checksums_are_filtered() {
        // Checksum 1 is in 3 applications, checksum 2 in 3 versions of one application.
        let g = try_graph_from(&[
            ("a#1", &[1, 2, 10]),
            ("a#2", &[2, 11]),
            ("a#3", &[2, 12]),
            ("b#1", &[1, 13]),
            ("c#1", &[1, 14]),
        ], Some(2)).unwrap();
        g.dbg_check();
        assert_eq!(g.num_filtered_checksums(), 1);
        assert!(g.find_checksum(&cs(1)).is_none());
        assert!(g.find_checksum(&cs(2)).is_some());
        assert_eq!(g.num_checksums(), 6);
    }

    #[test]
    fn from_corpus() {
        let mut corpus = Corpus::new();
        corpus.add("b", "1", cs(1));
        corpus.add("a", "1", cs(1));
        corpus.add("a", "1", cs(2));

        let g = GraphBuilder::from_corpus(&corpus, None).unwrap();
        g.dbg_check();
        assert_eq!(g.num_app_versions(), 2);
        let a = g.find_app_version(&av("a#1")).unwrap();
        assert_eq!(a, 0);
        assert_eq!(g.av(a).checksums.len(), 2);
    }
}
