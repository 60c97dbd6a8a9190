#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Knobs for [`build_solution`](crate::build_solution).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct BuildOptions {
    /// Size of the defining checksum set each app-version aims for. The balancer tops up
    /// app-versions below this, and the database stores at most this many checksums per
    /// app-version.
    pub max_checksums: usize,

    /// Checksums found in more than this many distinct applications are dropped before building
    /// the graph. `None` keeps everything.
    pub max_apps_per_checksum: Option<usize>,

    /// Upper bound on balancer passes.
    pub balancer_iterations: usize,

    /// Drop `trunk` snapshots from merged identities when a release of the same application has
    /// identical files.
    pub exclude_trunk: bool,

    /// Run the full consistency checks after peeling and balancing.
    pub verify: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_checksums: 5,
            max_apps_per_checksum: Some(10),
            balancer_iterations: 200,
            exclude_trunk: true,
            verify: true,
        }
    }
}

/// Knobs for the [`Detector`](crate::Detector).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct DetectOptions {
    /// Fraction of an app-version's (capped) defining checksums which must be observed before it
    /// can be reported.
    pub required_fraction: f64,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self { required_fraction: 0.5 }
    }
}
