//! The ingestion and liftover stages that run before a merge.

use std::io::Read;

use rayon::prelude::*;
use tracing::info;
use tracing::warn;

use crate::liftover;
use crate::liftover::Oracle;
use crate::orf::Assembly;
use crate::orf::Liftover;
use crate::orf::SourceId;
use crate::service::RetryPolicy;
use crate::source;
use crate::source::Parser;
use crate::store;
use crate::store::Store;
use crate::workers::Workers;

/// The default number of raw ORFs read per page during liftover.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// An error related to a pipeline stage.
#[derive(Debug)]
pub enum Error {
    /// The source could not be parsed.
    Source(source::Error),

    /// The store failed.
    Storage(store::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Source(err) => write!(f, "source error: {err}"),
            Error::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

/// What an insert did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Inserted {
    /// The raw ORFs read from the source.
    pub read: usize,

    /// The raw ORFs that were new.
    pub inserted: usize,
}

/// Reads a source through `parser` and inserts its raw ORFs. Raw ORFs that
/// are already stored are left alone, so inserting the same file twice
/// changes nothing.
pub fn insert<S>(
    store: &mut S,
    parser: &dyn Parser,
    source: &SourceId,
    assembly: &Assembly,
    reader: &mut dyn Read,
) -> Result<Inserted>
where
    S: Store + ?Sized,
{
    let orfs = parser.parse(reader, source, assembly).map_err(Error::Source)?;
    let mut result = Inserted {
        read: orfs.len(),
        ..Default::default()
    };

    for orf in orfs {
        let (_, inserted) = store.get_or_insert_raw(orf).map_err(Error::Storage)?;

        if inserted {
            result.inserted += 1;
        }
    }

    store.flush().map_err(Error::Storage)?;

    info!(
        "{source}: inserted {} of {} raw ORFs ({} already stored)",
        result.inserted,
        result.read,
        result.read - result.inserted
    );

    Ok(result)
}

/// What a liftover pass did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Lifted {
    /// The raw ORFs that mapped.
    pub mapped: usize,

    /// The raw ORFs that failed to map.
    pub failed: usize,

    /// The raw ORFs that were already mapped.
    pub skipped: usize,
}

/// Lifts every raw ORF that is pending or failed onto the `to` assembly.
///
/// Raw ORFs are read `page_size` at a time and lifted in parallel on
/// `workers`. Failures are recorded on the raw ORF (and retried by the next
/// pass) rather than returned.
pub fn lift_pending<S>(
    store: &mut S,
    oracle: &dyn Oracle,
    policy: &RetryPolicy,
    workers: &Workers,
    to: &Assembly,
    page_size: usize,
) -> Result<Lifted>
where
    S: Store + ?Sized,
{
    let mut result = Lifted::default();
    let mut after = None;

    loop {
        let page = store
            .raw_page(after, page_size.max(1))
            .map_err(Error::Storage)?;

        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id());

        let (todo, done): (Vec<_>, Vec<_>) = page
            .into_iter()
            .partition(|raw| !raw.liftover().succeeded());
        result.skipped += done.len();

        let outcomes = workers.install(|| {
            todo.par_iter()
                .map(|raw| (raw.id(), liftover::lift_raw(oracle, policy, raw, to)))
                .collect::<Vec<_>>()
        });

        for (id, outcome) in outcomes {
            match &outcome {
                Liftover::Failed { reason } => {
                    warn!("{id}: liftover failed: {reason}");
                    result.failed += 1;
                }
                _ => result.mapped += 1,
            }

            store.set_liftover(id, outcome).map_err(Error::Storage)?;
        }
    }

    store.flush().map_err(Error::Storage)?;

    info!(
        "lifted raw ORFs onto {to}: {} mapped, {} failed, {} already mapped",
        result.mapped, result.failed, result.skipped
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orf::RawOrfId;
    use crate::source::Tabular;
    use crate::store::Memory;
    use crate::testing::ShiftOracle;

    const DATA: &str = "chromosome\tstrand\tstart\tstop\tsplice_starts\tsplice_ends\tgene\ttranscript\n\
                        1\t+\t100\t400\t\t\tABC\t\n\
                        1\t+\t1000\t1400\t1000,1300\t1100,1400\t\t\n\
                        1\t-\t3000\t3300\t\t\t\t\n";

    #[test]
    fn test_inserting_twice_is_a_no_op() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut store = Memory::default();
        let source = SourceId::new("X");
        let assembly = Assembly::new("GRCh37");

        let first = insert(&mut store, &Tabular::tsv(), &source, &assembly, &mut DATA.as_bytes())?;
        assert_eq!(first, Inserted { read: 3, inserted: 3 });

        let second = insert(&mut store, &Tabular::tsv(), &source, &assembly, &mut DATA.as_bytes())?;
        assert_eq!(second, Inserted { read: 3, inserted: 0 });

        // The same rows from another source are new observations.
        let other = insert(
            &mut store,
            &Tabular::tsv(),
            &SourceId::new("Y"),
            &assembly,
            &mut DATA.as_bytes(),
        )?;
        assert_eq!(other.inserted, 3);

        Ok(())
    }

    #[test]
    fn test_failed_liftovers_are_retried() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut store = Memory::default();
        let source = SourceId::new("X");
        let current = Assembly::new("GRCh38");

        insert(
            &mut store,
            &Tabular::tsv(),
            &source,
            &Assembly::new("GRCh37"),
            &mut DATA.as_bytes(),
        )?;

        let workers = Workers::default();
        let policy = RetryPolicy::none();

        // The first base of the second exon of the spliced ORF does not map.
        let gapped = ShiftOracle::new(0).with_gap(1300, 1301);
        let result = lift_pending(&mut store, &gapped, &policy, &workers, &current, 2)?;
        assert_eq!(result, Lifted { mapped: 2, failed: 1, skipped: 0 });

        let spliced = store.raw(RawOrfId(2))?.unwrap();
        assert!(!spliced.liftover().succeeded());
        assert!(store.raw(RawOrfId(1))?.unwrap().liftover().succeeded());

        let result = lift_pending(&mut store, &ShiftOracle::new(0), &policy, &workers, &current, 2)?;
        assert_eq!(result, Lifted { mapped: 1, failed: 0, skipped: 2 });

        let spliced = store.raw(RawOrfId(2))?.unwrap();
        assert_eq!(spliced.liftover().locus(), Some(spliced.locus()));
        assert_eq!(spliced.liftover().length_diff(), Some(0));

        Ok(())
    }
}
