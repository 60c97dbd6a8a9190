//! Reading the training corpus.
//!
//! The corpus is a tab separated file with one row per (app-version, file):
//!
//! ```text
//! <app name>\t<app version>\t<sha256 checksum as hex>\t<depth in the app-version's file tree>
//! ```
//!
//! The depth column (and one further column after it) is optional and ignored here.

use std::collections::HashMap;
use std::io::BufRead;

use tracing::info;

use crate::{Checksum, IdxSet, Interner, ParseError, SingleAppVersion};

/// The raw checksum -> app-versions associations collected from known software releases, with
/// duplicates removed. This is what the [`GraphBuilder`](crate::GraphBuilder) consumes.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    interner: Interner,
    /// Values are interner ids.
    cs_to_av: HashMap<Checksum, IdxSet>,
    num_associations: usize,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interner(interner: Interner) -> Self {
        Self { interner, ..Self::default() }
    }

    /// Record that `app` at `version` contains a file with the given checksum. Returns false if
    /// this association was already known.
    pub fn add(&mut self, app: &str, version: &str, checksum: Checksum) -> bool {
        let id = self.interner.intern(app, version);
        let inserted = self.cs_to_av.entry(checksum).or_default().insert(id);
        if inserted { self.num_associations += 1; }
        inserted
    }

    /// Read a whole TSV corpus.
    pub fn read_tsv<R: BufRead>(reader: R) -> Result<Self, ParseError> {
        let mut corpus = Self::new();
        corpus.add_tsv(reader)?;
        Ok(corpus)
    }

    /// Read TSV rows into this corpus.
    pub fn add_tsv<R: BufRead>(&mut self, reader: R) -> Result<(), ParseError> {
        let mut rows = 0;
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = i + 1;

            let mut cols: Vec<&str> = line.split('\t').collect();
            while cols.last().map_or(false, |c| c.trim().is_empty()) {
                cols.pop();
            }
            if cols.is_empty() { continue; }
            if !(3..=5).contains(&cols.len()) {
                return Err(ParseError::InvalidRow { line: line_no, columns: cols.len() });
            }

            let checksum = Checksum::from_hex(cols[2].trim())
                .ok_or_else(|| ParseError::InvalidChecksum { line: line_no, value: cols[2].to_string() })?;
            self.add(cols[0], cols[1], checksum);
            rows += 1;
        }

        info!(rows, checksums = self.cs_to_av.len(), app_versions = self.interner.len(), "corpus read");
        Ok(())
    }

    pub fn app_versions(&self) -> &[SingleAppVersion] {
        self.interner.values()
    }

    /// Iterate over each checksum and the (interned) app-versions which contain it.
    pub fn checksums(&self) -> impl Iterator<Item=(&Checksum, &IdxSet)> + '_ {
        self.cs_to_av.iter()
    }

    pub fn app_version(&self, id: usize) -> &SingleAppVersion {
        self.interner.get(id)
    }

    pub fn num_checksums(&self) -> usize {
        self.cs_to_av.len()
    }

    pub fn num_associations(&self) -> usize {
        self.num_associations
    }

    pub fn is_empty(&self) -> bool {
        self.cs_to_av.is_empty()
    }

    /// Release the corpus' memory, handing back the interner for reuse.
    pub fn into_interner(self) -> Interner {
        self.interner
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hex(n: u8) -> String {
        Checksum::from_bytes([n; 32]).to_hex()
    }

    #[test]
    fn reads_rows() {
        let data = format!(
            "wordpress\t5.0\t{}\t1\n\nwordpress\t5.0\t{}\t2\t\t\njoomla\t3.9\t{}\n",
            hex(1), hex(2), hex(1)
        );
        let corpus = Corpus::read_tsv(data.as_bytes()).unwrap();
        assert_eq!(corpus.num_checksums(), 2);
        assert_eq!(corpus.app_versions().len(), 2);
        assert_eq!(corpus.num_associations(), 3);

        let (_, avs) = corpus.checksums()
            .find(|(cs, _)| **cs == Checksum::from_bytes([1; 32]))
            .unwrap();
        assert_eq!(avs.len(), 2);
    }

    #[test]
    fn duplicate_rows_are_ignored() {
        let mut corpus = Corpus::new();
        let cs = Checksum::from_bytes([7; 32]);
        assert!(corpus.add("a", "1", cs));
        assert!(!corpus.add("a", "1", cs));
        assert_eq!(corpus.num_associations(), 1);
    }

    #[test]
    fn bad_rows_report_line_numbers() {
        let data = format!("a\t1\t{}\nb\t2\n", hex(1));
        match Corpus::read_tsv(data.as_bytes()) {
            Err(ParseError::InvalidRow { line: 2, columns: 2 }) => {}
            other => panic!("unexpected result {:?}", other),
        }

        let data = format!("a\t1\t{}\t1\t2\t3\n", hex(1));
        assert!(matches!(Corpus::read_tsv(data.as_bytes()), Err(ParseError::InvalidRow { line: 1, columns: 6 })));

        let data = "a\t1\tnot-a-checksum\n";
        assert!(matches!(Corpus::read_tsv(data.as_bytes()), Err(ParseError::InvalidChecksum { line: 1, .. })));
    }
}
