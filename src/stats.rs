//! Build statistics, for reporting how well the corpus could be covered.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use humansize::{format_size, DECIMAL};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::balance::BalanceReport;
use crate::merge::MergeReport;
use crate::Solution;

/// An app-version which ended up with no defining checksums.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Undetected {
    pub identity: String,
    pub checksums: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Statistics {
    pub app_versions: usize,
    pub defined: usize,
    pub checksums: usize,
    /// Checksums dropped for being shared by too many applications.
    pub filtered_checksums: usize,
    pub implications: usize,
    pub released: usize,
    pub merge: MergeReport,
    pub balance: BalanceReport,

    /// Defining set size (capped at `max_checksums`) -> number of defined app-versions.
    pub histogram: BTreeMap<usize, usize>,
    /// Mean capped defining set size over all app-versions, including undefined ones.
    pub average_defining: f64,
    pub estimated_memory: usize,

    /// Sorted by identity.
    pub undetected: Vec<Undetected>,
}

impl Statistics {
    pub fn from_solution(solution: &Solution) -> Self {
        let graph = &solution.graph;
        let max = solution.options.max_checksums;

        let mut histogram = BTreeMap::new();
        for &av in solution.defined.iter() {
            *histogram.entry(graph.av(av).checksums.len().min(max)).or_insert(0) += 1;
        }

        let total_capped: usize = graph.live_app_versions()
            .map(|av| graph.av(av).checksums.len().min(max))
            .sum();
        let app_versions = graph.num_app_versions();
        let average_defining = if app_versions == 0 { 0.0 } else { total_capped as f64 / app_versions as f64 };

        let mut undetected: Vec<Undetected> = solution.undefined.iter()
            .map(|&av| {
                let entry = graph.av(av);
                Undetected { identity: entry.key.to_string(), checksums: entry.checksums.len() }
            })
            .collect();
        undetected.sort_unstable_by(|a, b| a.identity.cmp(&b.identity));

        Self {
            app_versions,
            defined: solution.defined.len(),
            checksums: graph.num_checksums(),
            filtered_checksums: graph.num_filtered_checksums(),
            implications: solution.implications,
            released: solution.peel.released,
            merge: solution.merge,
            balance: solution.balance,
            histogram,
            average_defining,
            estimated_memory: graph.estimated_heap_size(),
            undetected,
        }
    }

    /// The "undetected" report: one line per app-version with no defining checksums.
    pub fn undetected_report(&self) -> String {
        let mut out = String::new();
        if self.undetected.is_empty() { return out; }
        out.push_str(&format!("Not defined app-versions: {}\n", self.undetected.len()));
        for u in self.undetected.iter() {
            out.push_str(&format!("{}, checksums: {}\n", u.identity, u.checksums));
        }
        out
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Result: {}/{} app-versions defined", self.defined, self.app_versions)?;
        writeln!(f, "Checksums: {} ({} filtered as too widely shared)", self.checksums, self.filtered_checksums)?;
        writeln!(f, "Merged {} app-versions into {} entries", self.merge.merged_app_versions, self.merge.groups)?;
        writeln!(f, "Implications: {}", self.implications)?;
        writeln!(f, "Balancer: {} transfers ({} checksums) in {} iterations, {} full re-sorts",
            self.balance.transfers, self.balance.moved_checksums, self.balance.iterations, self.balance.full_resorts)?;
        writeln!(f, "Defining set sizes:")?;
        for (size, count) in self.histogram.iter() {
            writeln!(f, "  {size} -> {count}")?;
        }
        writeln!(f, "Average defining set size: {:.3}", self.average_defining)?;
        writeln!(f, "Graph memory: ~{}", format_size(self.estimated_memory, DECIMAL))
    }
}

impl Solution {
    pub fn stats(&self) -> Statistics {
        Statistics::from_solution(self)
    }
}
