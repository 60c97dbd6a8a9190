use crate::graph::Graph;
use crate::InvariantViolation;

impl Graph {
    /// Check that every owns / released link is stored on both sides, that no app-version both
    /// owns and released the same checksum, and that removed entries hold no links.
    pub fn check_links(&self) -> Result<(), InvariantViolation> {
        for av in self.app_versions.iter() {
            if !av.is_live() && (!av.checksums.is_empty() || !av.released.is_empty()) {
                return Err(InvariantViolation::DeadEntryLinked(av.key.clone()));
            }
        }

        for (cs_idx, cs) in self.checksums.iter().enumerate() {
            cs.app_versions.debug_check_sorted();
            cs.depends_on.debug_check_sorted();

            let broken = |av: usize| InvariantViolation::BrokenLink {
                checksum: cs.key,
                app_version: self.app_versions[av].key.clone(),
            };

            for av in cs.app_versions.iter() {
                if cs.depends_on.contains(av) {
                    return Err(InvariantViolation::OwnedAndReleased {
                        checksum: cs.key,
                        app_version: self.app_versions[av].key.clone(),
                    });
                }
                let entry = &self.app_versions[av];
                if !entry.is_live() { return Err(InvariantViolation::DeadEntryLinked(entry.key.clone())); }
                if !entry.checksums.contains(&cs_idx) {
                    return Err(broken(av));
                }
            }

            for av in cs.depends_on.iter() {
                let entry = &self.app_versions[av];
                if !entry.is_live() { return Err(InvariantViolation::DeadEntryLinked(entry.key.clone())); }
                if !entry.released.contains(&cs_idx) {
                    return Err(broken(av));
                }
            }
        }

        // And the other direction.
        for (av_idx, av) in self.app_versions.iter().enumerate() {
            for &cs in av.checksums.iter() {
                let entry = &self.checksums[cs];
                if !entry.app_versions.contains(av_idx) {
                    return Err(InvariantViolation::BrokenLink { checksum: entry.key, app_version: av.key.clone() });
                }
            }
            for &cs in av.released.iter() {
                let entry = &self.checksums[cs];
                if !entry.depends_on.contains(av_idx) {
                    return Err(InvariantViolation::BrokenLink { checksum: entry.key, app_version: av.key.clone() });
                }
            }
        }

        Ok(())
    }

    /// After peeling, every checksum has exactly one owner.
    pub fn check_single_owners(&self) -> Result<(), InvariantViolation> {
        for cs in self.checksums.iter() {
            if cs.app_versions.len() != 1 {
                return Err(InvariantViolation::NotSingleOwner {
                    checksum: cs.key,
                    owners: cs.app_versions.len(),
                });
            }
        }
        Ok(())
    }

    #[allow(unused)]
    pub fn dbg_check(&self) {
        if let Err(e) = self.check_links() {
            panic!("Graph is inconsistent: {e}");
        }

        for (idx, av) in self.app_versions.iter().enumerate() {
            if av.is_live() {
                assert_eq!(self.find_app_version(&av.key), Some(idx));
            }
            av.implies.debug_check_sorted();
            assert!(!av.implies.contains(idx), "App-version implies itself");
        }
        assert_eq!(self.live_app_versions().count(), self.num_app_versions());

        for (idx, cs) in self.checksums.iter().enumerate() {
            assert_eq!(self.find_checksum(&cs.key), Some(idx));
        }
        // Checksum arena order is hash order.
        assert!(self.checksums.windows(2).all(|w| w[0].key < w[1].key));
    }
}

#[cfg(test)]
mod test {
    use crate::graph::test::{av, cs, graph_from};
    use crate::InvariantViolation;

    #[test]
    fn detects_one_sided_link() {
        let mut g = graph_from(&[("a#1", &[1, 2]), ("b#1", &[2])]);
        assert_eq!(g.check_links(), Ok(()));

        let c = g.find_checksum(&cs(2)).unwrap();
        let b = g.find_app_version(&av("b#1")).unwrap();
        g.app_versions[b].checksums.remove(&c);
        assert_eq!(g.check_links(), Err(InvariantViolation::BrokenLink {
            checksum: cs(2),
            app_version: av("b#1"),
        }));
    }

    #[test]
    fn detects_owned_and_released() {
        let mut g = graph_from(&[("a#1", &[1])]);
        g.checksums[0].depends_on.insert(0);
        g.app_versions[0].released.insert(0);
        assert_eq!(g.check_links(), Err(InvariantViolation::OwnedAndReleased {
            checksum: cs(1),
            app_version: av("a#1"),
        }));
    }

    #[test]
    fn single_owners() {
        let mut g = graph_from(&[("a#1", &[1, 2]), ("b#1", &[2])]);
        assert!(matches!(g.check_single_owners(), Err(InvariantViolation::NotSingleOwner { owners: 2, .. })));
        let b = g.find_app_version(&av("b#1")).unwrap();
        let c = g.find_checksum(&cs(2)).unwrap();
        g.release(b, c);
        assert_eq!(g.check_single_owners(), Ok(()));
        g.dbg_check();
    }
}
