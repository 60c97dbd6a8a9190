//! Matching observed checksums against a [`Database`].
//!
//! An app-version is *detected* when
//!
//! 1. enough of its stored checksums were observed (see [`DetectOptions::required_fraction`]), and
//! 2. at least one of its observed checksums isn't explained away: none of the app-versions that
//!    checksum depends on is itself detected.
//!
//! The second rule is recursive, and well founded because the dependency graph is acyclic.
//!
//! Separately, an app-version is reported as *implied* when a detected app-version implies it (all
//! its files ship in the detected one) and it passes the fraction test, even though rule 2 rejected
//! it.

use std::collections::{BTreeMap, HashMap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Checksum, ChecksumRecord, Database, DbId, DetectOptions};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Detection {
    /// App-versions proven present by their own checksums.
    pub detected: Vec<DbId>,
    /// App-versions contained in a detected app-version which also pass the fraction test.
    pub implied: Vec<DbId>,

    /// Matched, but too few of their checksums were observed.
    pub filtered_by_fraction: Vec<DbId>,
    /// Passed the fraction test, but every observed checksum depends on a detected app-version.
    pub filtered_by_depends_on: Vec<DbId>,
    /// Filtered by depends-on, and not implied by any detected app-version either. Something
    /// detected explains their files away without containing them.
    pub potentially_missed_implied: Vec<DbId>,
}

impl Detection {
    /// Everything reported as present: detected and implied, sorted.
    pub fn reported(&self) -> Vec<DbId> {
        let mut all: Vec<DbId> = self.detected.iter().chain(self.implied.iter()).copied().collect();
        all.sort_unstable();
        all.dedup();
        all
    }
}

#[derive(Debug, Clone)]
pub struct Detector<'a> {
    db: &'a Database,
    options: DetectOptions,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Validity { Visiting, Valid, Invalid }

struct Matches<'a> {
    by_owner: BTreeMap<DbId, Vec<&'a ChecksumRecord>>,
    passes_fraction: HashMap<DbId, bool>,
    validity: HashMap<DbId, Validity>,
}

impl<'a> Detector<'a> {
    pub fn new(db: &'a Database, options: DetectOptions) -> Self {
        Self { db, options }
    }

    fn passes_fraction(&self, id: DbId, matched: usize) -> bool {
        let total = self.db.app_version(id).map_or(0, |r| r.total);
        total > 0 && matched as f64 >= self.options.required_fraction * total as f64
    }

    pub fn detect<'c, I>(&self, observed: I) -> Detection
        where I: IntoIterator<Item=&'c Checksum>
    {
        let mut by_owner: BTreeMap<DbId, Vec<&ChecksumRecord>> = BTreeMap::new();
        for checksum in observed {
            if let Some(record) = self.db.lookup(checksum) {
                by_owner.entry(record.app_version).or_default().push(record);
            }
        }
        for records in by_owner.values_mut() {
            records.sort_unstable_by(|a, b| a.checksum.cmp(&b.checksum));
            records.dedup_by(|a, b| a.checksum == b.checksum);
        }

        let passes_fraction = by_owner.iter()
            .map(|(&id, records)| (id, self.passes_fraction(id, records.len())))
            .collect();
        let mut m = Matches { by_owner, passes_fraction, validity: HashMap::new() };

        let mut result = Detection::default();
        let ids: Vec<DbId> = m.by_owner.keys().copied().collect();
        for id in ids {
            if !m.passes_fraction[&id] {
                result.filtered_by_fraction.push(id);
            } else if Self::is_valid(&mut m, id) {
                result.detected.push(id);
            } else {
                result.filtered_by_depends_on.push(id);
            }
        }

        for &id in result.detected.iter() {
            let Some(record) = self.db.app_version(id) else { continue; };
            result.implied.extend(record.implies.iter()
                .copied()
                .filter(|implied| m.passes_fraction.get(implied).copied().unwrap_or(false)));
        }
        result.implied.retain(|id| result.detected.binary_search(id).is_err());
        result.implied.sort_unstable();
        result.implied.dedup();

        result.potentially_missed_implied = result.filtered_by_depends_on.iter()
            .copied()
            .filter(|id| result.implied.binary_search(id).is_err())
            .collect();

        result
    }

    /// An app-version is valid if it passes the fraction test and one of its observed checksums
    /// depends on no valid app-version.
    fn is_valid(m: &mut Matches<'_>, id: DbId) -> bool {
        match m.validity.get(&id) {
            Some(Validity::Valid) => return true,
            // A cycle can only come from a corrupt database. Treat it as not proven.
            Some(Validity::Invalid) | Some(Validity::Visiting) => return false,
            None => {}
        }
        if !m.passes_fraction.get(&id).copied().unwrap_or(false) {
            m.validity.insert(id, Validity::Invalid);
            return false;
        }

        m.validity.insert(id, Validity::Visiting);
        let records = m.by_owner.get(&id).cloned().unwrap_or_default();
        let valid = records.iter().any(|record| {
            record.depends_on.iter().all(|&dep| !Self::is_valid(m, dep))
        });
        m.validity.insert(id, if valid { Validity::Valid } else { Validity::Invalid });
        valid
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::test::cs;
    use crate::{build_solution, AppVersionRecord, BuildOptions, Corpus, SingleAppVersion};

    fn superset_db() -> Database {
        let mut corpus = Corpus::new();
        for n in 1..=3 { corpus.add("app", "1", cs(n)); }
        for n in 1..=6 { corpus.add("app", "2", cs(n)); }
        build_solution(&corpus, &BuildOptions::default()).unwrap().database()
    }

    #[test]
    fn superset_present() {
        let db = superset_db();
        let detector = Detector::new(&db, DetectOptions::default());
        let observed: Vec<Checksum> = (1..=6).map(cs).collect();
        let d = detector.detect(&observed);
        assert_eq!(d.detected, [1]);
        assert_eq!(d.filtered_by_depends_on, [0]);
        assert_eq!(d.implied, [0]);
        assert!(d.potentially_missed_implied.is_empty());
        assert_eq!(d.reported(), [0, 1]);
    }

    #[test]
    fn subset_present() {
        let db = superset_db();
        let detector = Detector::new(&db, DetectOptions::default());
        let observed: Vec<Checksum> = (1..=3).map(cs).collect();
        let d = detector.detect(&observed);
        assert_eq!(d.detected, [0]);
        assert!(d.implied.is_empty());
        assert!(d.filtered_by_depends_on.is_empty());
    }

    #[test]
    fn fraction_filter() {
        let db = superset_db();
        let detector = Detector::new(&db, DetectOptions::default());
        // One of app#2's three checksums, plus an unknown one.
        let observed = [cs(4), cs(99)];
        let d = detector.detect(observed.iter());
        assert!(d.detected.is_empty());
        assert_eq!(d.filtered_by_fraction, [1]);

        let lenient = Detector::new(&db, DetectOptions { required_fraction: 0.3 });
        assert_eq!(lenient.detect(observed.iter()).detected, [1]);

        // Seeing the same checksum twice only counts once.
        let observed = [cs(4), cs(4)];
        assert!(detector.detect(observed.iter()).detected.is_empty());
    }

    #[test]
    fn implied_but_too_few_files() {
        let db = superset_db();
        let detector = Detector::new(&db, DetectOptions::default());
        let observed: Vec<Checksum> = [1, 4, 5, 6].into_iter().map(cs).collect();
        let d = detector.detect(&observed);
        assert_eq!(d.detected, [1]);
        assert_eq!(d.filtered_by_fraction, [0]);
        assert!(d.potentially_missed_implied.is_empty());
        assert!(d.implied.is_empty());
    }

    #[test]
    fn dependency_chains_resolve() {
        // c (id 2) depends on b (id 1), which depends on a (id 0). With everything observed, a is
        // valid, so b is explained away, so c is valid again.
        let record = |name: &str| AppVersionRecord {
            identity: vec![SingleAppVersion::new(name, "1")],
            implies: vec![],
            total: 1,
        };
        let db = Database {
            app_versions: vec![record("a"), record("b"), record("c")],
            checksums: vec![
                ChecksumRecord { checksum: cs(1), app_version: 0, depends_on: vec![] },
                ChecksumRecord { checksum: cs(2), app_version: 1, depends_on: vec![0] },
                ChecksumRecord { checksum: cs(3), app_version: 2, depends_on: vec![1] },
            ],
        };
        let detector = Detector::new(&db, DetectOptions::default());
        let all: Vec<Checksum> = (1..=3).map(cs).collect();
        let d = detector.detect(&all);
        assert_eq!(d.detected, [0, 2]);
        assert_eq!(d.filtered_by_depends_on, [1]);

        let d = detector.detect([cs(2), cs(3)].iter());
        assert_eq!(d.detected, [1]);
        assert_eq!(d.filtered_by_depends_on, [2]);
    }

    #[test]
    fn explained_away_without_superset() {
        // b's files depend on a, but a doesn't contain b. Seeing both detects a, and b is neither
        // detected nor implied.
        let db = Database {
            app_versions: vec![
                AppVersionRecord { identity: vec![SingleAppVersion::new("a", "1")], implies: vec![], total: 2 },
                AppVersionRecord { identity: vec![SingleAppVersion::new("b", "1")], implies: vec![], total: 1 },
            ],
            checksums: vec![
                ChecksumRecord { checksum: cs(1), app_version: 0, depends_on: vec![] },
                ChecksumRecord { checksum: cs(2), app_version: 0, depends_on: vec![] },
                ChecksumRecord { checksum: cs(3), app_version: 1, depends_on: vec![0] },
            ],
        };
        let detector = Detector::new(&db, DetectOptions::default());
        let d = detector.detect([cs(1), cs(2), cs(3)].iter());
        assert_eq!(d.detected, [0]);
        assert_eq!(d.filtered_by_depends_on, [1]);
        assert!(d.implied.is_empty());
        assert_eq!(d.potentially_missed_implied, [1]);

        // With a implying b, b is recovered instead.
        let mut db = db;
        db.app_versions[0].implies = vec![1];
        let d = Detector::new(&db, DetectOptions::default()).detect([cs(1), cs(2), cs(3)].iter());
        assert_eq!(d.implied, [1]);
        assert!(d.potentially_missed_implied.is_empty());
    }
}
