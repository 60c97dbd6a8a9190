//! The full build pipeline: corpus -> graph -> merge -> inclusion -> peeling -> balancing.

use tracing::info;

use crate::balance::{balance, BalanceReport};
use crate::graph::Graph;
use crate::inclusion::find_inclusions;
use crate::merge::{merge_same_checksums, MergeReport};
use crate::peel::{peel, PeelReport};
use crate::{AvIdx, BuildOptions, Corpus, Error, GraphBuilder, InvariantViolation};

/// A solved graph. Every checksum has exactly one owner, and the live app-versions are partitioned
/// into defined ones (which own at least one checksum) and undefined ones.
#[derive(Debug, Clone)]
pub struct Solution {
    pub(crate) graph: Graph,
    pub(crate) options: BuildOptions,

    /// Defined app-versions, in identity order.
    pub(crate) defined: Vec<AvIdx>,
    /// Undefined app-versions, in identity order.
    pub(crate) undefined: Vec<AvIdx>,

    pub(crate) merge: MergeReport,
    pub(crate) implications: usize,
    pub(crate) peel: PeelReport,
    pub(crate) balance: BalanceReport,
}

/// Run every pass over a corpus.
///
/// Fails with [`Error::Build`] if the corpus can't be turned into a graph, and with
/// [`Error::Invariant`] if one of the consistency checks catches a bug. The latter should abort
/// whatever tool is running the build.
pub fn build_solution(corpus: &Corpus, options: &BuildOptions) -> Result<Solution, Error> {
    let graph = GraphBuilder::from_corpus(corpus, options.max_apps_per_checksum)?;
    Ok(Solution::from_graph(graph, options)?)
}

impl Solution {
    /// Run the passes over a freshly built graph.
    pub fn from_graph(mut graph: Graph, options: &BuildOptions) -> Result<Self, InvariantViolation> {
        let merge = merge_same_checksums(&mut graph, options.exclude_trunk);
        let implications = find_inclusions(&mut graph);
        let peel = peel(&mut graph);
        if options.verify {
            graph.check_links()?;
            graph.check_single_owners()?;
        }
        let balance = balance(&mut graph, options.max_checksums, options.balancer_iterations, options.verify)?;

        let mut live: Vec<AvIdx> = graph.live_app_versions().collect();
        live.sort_unstable_by(|a, b| graph.av(*a).key.cmp(&graph.av(*b).key));
        let (defined, undefined): (Vec<AvIdx>, Vec<AvIdx>) = live.into_iter()
            .partition(|&av| graph.av(av).is_defined());

        info!(defined = defined.len(), undefined = undefined.len(), "solution built");
        Ok(Self {
            graph,
            options: options.clone(),
            defined,
            undefined,
            merge,
            implications,
            peel,
            balance,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Defined app-versions in identity order.
    pub fn defined(&self) -> &[AvIdx] {
        &self.defined
    }

    /// App-versions which own no checksum at all, in identity order. These can't be detected.
    pub fn undefined(&self) -> &[AvIdx] {
        &self.undefined
    }

    pub fn merge_report(&self) -> MergeReport {
        self.merge
    }

    pub fn peel_report(&self) -> &PeelReport {
        &self.peel
    }

    pub fn balance_report(&self) -> BalanceReport {
        self.balance
    }
}
