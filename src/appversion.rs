use std::fmt::{Display, Formatter};

use smallvec::SmallVec;
use smartstring::alias::String as SmartString;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Version string used by development snapshots. See [`crate::merge`].
pub const TRUNK: &str = "trunk";

/// A single (application, version) pair, as named in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SingleAppVersion {
    pub app: SmartString,
    pub version: SmartString,
}

impl SingleAppVersion {
    pub fn new(app: &str, version: &str) -> Self {
        Self { app: app.into(), version: version.into() }
    }

    pub fn is_trunk(&self) -> bool {
        self.version == TRUNK
    }
}

impl Display for SingleAppVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.app, self.version)
    }
}

/// The identity of an app-version entry in the graph.
///
/// This is either a single app-version from the corpus, or a set of app-versions which were
/// collapsed together by the merge pass because they contain exactly the same files.
///
/// Merged identities are kept flattened and sorted, so merging two merged identities (or merging
/// the same members in a different order) always produces the same value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AppVersion {
    Single(SingleAppVersion),
    Merged(SmallVec<[SingleAppVersion; 2]>),
}

impl AppVersion {
    pub fn single(app: &str, version: &str) -> Self {
        AppVersion::Single(SingleAppVersion::new(app, version))
    }

    /// Collapse a set of identities into one. Nested merged identities are flattened. If only one
    /// distinct member remains, the result is a plain [`AppVersion::Single`].
    ///
    /// Panics if `members` is empty.
    pub fn merged<I: IntoIterator<Item=AppVersion>>(members: I) -> Self {
        let mut flat: SmallVec<[SingleAppVersion; 2]> = SmallVec::new();
        for m in members {
            match m {
                AppVersion::Single(s) => flat.push(s),
                AppVersion::Merged(ss) => flat.extend(ss),
            }
        }
        flat.sort_unstable();
        flat.dedup();

        assert!(!flat.is_empty(), "Cannot merge an empty set of app-versions");
        if flat.len() == 1 {
            AppVersion::Single(flat.swap_remove(0))
        } else {
            AppVersion::Merged(flat)
        }
    }

    /// All the single app-versions making up this identity, in sorted order.
    pub fn singles(&self) -> &[SingleAppVersion] {
        match self {
            AppVersion::Single(s) => std::slice::from_ref(s),
            AppVersion::Merged(ss) => ss.as_slice(),
        }
    }

    pub fn apps(&self) -> impl Iterator<Item=&str> + '_ {
        self.singles().iter().map(|s| s.app.as_str())
    }

    pub fn versions(&self) -> impl Iterator<Item=&str> + '_ {
        self.singles().iter().map(|s| s.version.as_str())
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, AppVersion::Merged(_))
    }
}

impl From<SingleAppVersion> for AppVersion {
    fn from(s: SingleAppVersion) -> Self {
        AppVersion::Single(s)
    }
}

impl Display for AppVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppVersion::Single(s) => Display::fmt(s, f),
            AppVersion::Merged(ss) => {
                f.write_str("[")?;
                for (i, s) in ss.iter().enumerate() {
                    if i > 0 { f.write_str(", ")?; }
                    Display::fmt(s, f)?;
                }
                f.write_str("]")
            }
        }
    }
}
