//! Store-level statistics.

use std::collections::BTreeMap;

use crate::orf::Liftover;
use crate::orf::SourceId;
use crate::store;
use crate::store::Store;

/// The number of records read per page.
const PAGE_SIZE: usize = 10_000;

/// Gets `part` as a percentage of `total`.
///
/// The fraction is rounded to three decimal places before it is scaled, so
/// percentages have at most one decimal place. An empty total is 0%.
///
/// # Examples
///
/// ```
/// use orfdb::stats::percent;
///
/// assert_eq!(percent(1, 3), 33.3);
/// assert_eq!(percent(2, 3), 66.7);
/// assert_eq!(percent(5, 0), 0.0);
/// ```
pub fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    // Equal to rounding to three decimals and then scaling by 100, but
    // normalized to the nearest one-decimal float: the literal form leaves
    // binary noise (0.333 * 100 is 33.300000000000004).
    ((part as f64 / total as f64) * 1000.0).round() / 10.0
}

/// Counts of raw ORFs per source.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceCounts {
    /// The raw ORFs.
    pub raw: u64,

    /// The raw ORFs lifted onto the current assembly.
    pub lifted: u64,

    /// The raw ORFs that failed liftover.
    pub failed: u64,

    /// The raw ORFs merged into a canonical ORF.
    pub merged: u64,
}

/// A summary of the contents of a store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    /// The raw ORF counts by source.
    pub sources: BTreeMap<SourceId, SourceCounts>,

    /// The canonical ORFs.
    pub orfs: u64,

    /// The canonical ORFs supported by more than one raw ORF.
    pub supported: u64,

    /// The canonical ORFs with at least one ambiguous contribution.
    pub ambiguous: u64,

    /// The gene conflicts.
    pub conflicts: u64,

    /// The canonical ORFs in the derived namespace.
    pub filtered: u64,
}

impl Summary {
    /// Collects the summary of a store.
    pub fn collect<S>(store: &S) -> store::Result<Self>
    where
        S: Store + ?Sized,
    {
        let mut summary = Summary::default();

        let mut after = None;
        loop {
            let page = store.raw_page(after, PAGE_SIZE)?;

            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id());

            for raw in page {
                let counts = summary.sources.entry(raw.source().clone()).or_default();
                counts.raw += 1;

                match raw.liftover() {
                    Liftover::Mapped { .. } => counts.lifted += 1,
                    Liftover::Failed { .. } => counts.failed += 1,
                    Liftover::Pending => {}
                }

                if store.merged_into(raw.id())?.is_some() {
                    counts.merged += 1;
                }
            }
        }

        let mut after = None;
        loop {
            let page = store.orf_page(after, PAGE_SIZE)?;

            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id());

            for orf in page {
                summary.orfs += 1;

                if orf.count_ds() > 1 {
                    summary.supported += 1;
                }

                if orf.count_ds_ambiguous() > 0 {
                    summary.ambiguous += 1;
                }
            }
        }

        summary.conflicts = store.conflicts()?.len() as u64;
        summary.filtered = store.filtered()?.len() as u64;

        Ok(summary)
    }

    /// Gets the total number of raw ORFs.
    pub fn raw(&self) -> u64 {
        self.sources.values().map(|c| c.raw).sum()
    }

    /// Gets the total number of merged raw ORFs.
    pub fn merged(&self) -> u64 {
        self.sources.values().map(|c| c.merged).sum()
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "source\traw\tlifted\tfailed\tmerged\tmerged (%)")?;

        for (source, counts) in &self.sources {
            writeln!(
                f,
                "{source}\t{}\t{}\t{}\t{}\t{}",
                counts.raw,
                counts.lifted,
                counts.failed,
                counts.merged,
                percent(counts.merged, counts.raw)
            )?;
        }

        writeln!(
            f,
            "total\t{}\t\t\t{}\t{}",
            self.raw(),
            self.merged(),
            percent(self.merged(), self.raw())
        )?;
        writeln!(f)?;
        writeln!(f, "canonical ORFs\t{}", self.orfs)?;
        writeln!(
            f,
            "supported by more than one raw ORF\t{} ({}%)",
            self.supported,
            percent(self.supported, self.orfs)
        )?;
        writeln!(
            f,
            "with ambiguous contributions\t{} ({}%)",
            self.ambiguous,
            percent(self.ambiguous, self.orfs)
        )?;
        writeln!(f, "gene conflicts\t{}", self.conflicts)?;
        write!(f, "filtered\t{}", self.filtered)
    }
}
