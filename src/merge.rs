//! Deduplicating lifted raw ORFs into canonical ORFs.
//!
//! Merging a batch of raw ORFs happens in two steps:
//!
//! 1. [`prepare()`] looks at every raw ORF on its own (in parallel): it
//!    computes the canonical key from the lifted locus, resolves genes and
//!    transcripts, and fetches and translates the sequence of keys the store
//!    does not know yet. Nothing is written.
//! 2. An [`Engine`] folds the prepared records into a [`Changeset`] on a
//!    single thread. The changeset is then committed as a whole.
//!
//! Raw ORFs that failed liftover are skipped. Raw ORFs that resolve to no
//! gene, or whose preparation fails, are left unmerged and are picked up
//! again by later runs.

use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use crate::annotation::Lookup;
use crate::annotation::Resolution;
use crate::annotation::Resolver;
use crate::core::Key;
use crate::core::Locus;
use crate::orf::Liftover;
use crate::orf::RawOrf;
use crate::orf::RawOrfId;
use crate::sequence;
use crate::sequence::Source;
use crate::service::RetryPolicy;
use crate::store;
use crate::store::Changeset;
use crate::store::Committed;
use crate::store::Contribution;
use crate::store::NewOrf;
use crate::store::Store;

/// The external services a merge relies on.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    /// The annotation lookup.
    pub annotation: &'a dyn Lookup,

    /// The sequence source.
    pub sequence: &'a dyn Source,

    /// How to retry the services.
    pub policy: &'a RetryPolicy,
}

impl std::fmt::Debug for Services<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("policy", self.policy)
            .finish_non_exhaustive()
    }
}

/// What preparing one raw ORF produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The raw ORF has not been lifted onto the current assembly.
    Skipped,

    /// The raw ORF overlaps no (matching) gene.
    Unresolved,

    /// A service failed for this raw ORF.
    Failed(String),

    /// The raw ORF is ready to be merged.
    Ready {
        /// The lifted locus.
        locus: Locus,

        /// How the raw ORF resolved.
        resolution: Resolution,

        /// The nucleotide and amino-acid sequences, if the canonical ORF does
        /// not exist yet.
        sequences: Option<(String, String)>,
    },
}

/// A raw ORF after preparation.
#[derive(Clone, Debug, PartialEq)]
pub struct Prepared {
    /// The raw ORF.
    pub raw: RawOrfId,

    /// The outcome.
    pub outcome: Outcome,
}

/// Prepares one raw ORF. Only storage errors are returned as errors.
fn prepare_one<S>(store: &S, services: &Services<'_>, raw: &RawOrf) -> store::Result<Prepared>
where
    S: Store + ?Sized,
{
    let prepared = |outcome| Ok(Prepared {
        raw: raw.id(),
        outcome,
    });

    let locus = match raw.liftover() {
        Liftover::Mapped { locus, .. } => locus,
        _ => return prepared(Outcome::Skipped),
    };

    let resolution = match Resolver::new(services.annotation, services.policy).resolve(raw, locus) {
        Ok(Resolution::Unresolved) => return prepared(Outcome::Unresolved),
        Ok(resolution) => resolution,
        Err(err) => return prepared(Outcome::Failed(format!("annotation lookup failed: {err}"))),
    };

    let sequences = match store.orf_by_key(&locus.key())? {
        Some(_) => None,
        None => {
            match services
                .policy
                .run("sequence fetch", || services.sequence.fetch(locus))
            {
                Ok(nucleotides) => {
                    let protein = sequence::translate(&nucleotides);
                    Some((String::from_utf8_lossy(&nucleotides).into_owned(), protein))
                }
                Err(err) => {
                    return prepared(Outcome::Failed(format!("sequence fetch failed: {err}")))
                }
            }
        }
    };

    prepared(Outcome::Ready {
        locus: locus.clone(),
        resolution,
        sequences,
    })
}

/// Prepares a batch of raw ORFs in parallel, preserving their order.
///
/// Per-record service failures are reported as [`Outcome::Failed`]; only a
/// failing store aborts the batch.
pub fn prepare<S>(store: &S, services: &Services<'_>, raws: &[RawOrf]) -> store::Result<Vec<Prepared>>
where
    S: Store + ?Sized,
{
    raws.par_iter()
        .map(|raw| prepare_one(store, services, raw))
        .collect()
}

/// Tallies of a merge.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Report {
    /// The raw ORFs merged into a canonical ORF.
    pub merged: usize,

    /// The canonical ORFs created.
    pub created: usize,

    /// The raw ORFs that resolved to no gene.
    pub unresolved: usize,

    /// The raw ORFs that failed preparation.
    pub failed: usize,

    /// The raw ORFs skipped because they have not been lifted.
    pub skipped: usize,

    /// The raw ORFs that resolved to more than one gene.
    pub conflicts: usize,
}

impl Report {
    /// Adds another report to this one.
    pub fn add(&mut self, other: &Report) {
        self.merged += other.merged;
        self.created += other.created;
        self.unresolved += other.unresolved;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.conflicts += other.conflicts;
    }

    /// Records what a commit changed.
    pub fn record(&mut self, committed: &Committed) {
        self.merged += committed.merged;
        self.created += committed.created;
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} merged ({} new ORFs, {} conflicts), {} unresolved, {} failed, {} not lifted",
            self.merged, self.created, self.conflicts, self.unresolved, self.failed, self.skipped
        )
    }
}

/// Folds prepared raw ORFs into changesets.
#[derive(Debug, Default)]
pub struct Engine {
    /// The tallies of everything staged so far.
    report: Report,
}

impl Engine {
    /// Creates a new [`Engine`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the tallies of everything staged so far. Merges and created ORFs
    /// are only known once committed and are not part of this report.
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Stages a batch of prepared raw ORFs into a changeset.
    ///
    /// The changeset does not depend on the order of `prepared`: canonical
    /// ORFs are keyed by locus, and every raw ORF contributes at most once.
    pub fn stage(&mut self, prepared: Vec<Prepared>) -> Changeset {
        let mut changes = Changeset::default();
        let mut conflicts = 0;

        for Prepared { raw, outcome } in prepared {
            match outcome {
                Outcome::Skipped => {
                    debug!("{raw}: not lifted, skipping");
                    self.report.skipped += 1;
                }
                Outcome::Unresolved => {
                    debug!("{raw}: no matching gene, leaving unmerged");
                    self.report.unresolved += 1;
                }
                Outcome::Failed(reason) => {
                    warn!("{raw}: {reason}");
                    self.report.failed += 1;
                }
                Outcome::Ready {
                    locus,
                    resolution,
                    sequences,
                } => {
                    if changes.contributions.iter().any(|c| c.raw == raw) {
                        continue;
                    }

                    let key: Key = locus.key();

                    if let Some((sequence, protein)) = sequences {
                        changes.orfs.entry(key.clone()).or_insert(NewOrf {
                            locus,
                            sequence,
                            protein,
                        });
                    }

                    if resolution.conflicted() {
                        conflicts += 1;
                    }

                    changes.contributions.push(Contribution {
                        raw,
                        key,
                        targets: resolution.targets().to_vec(),
                        conflict: resolution.conflict().cloned(),
                    });
                }
            }
        }

        changes.contributions.sort_by_key(|c| c.raw);
        self.report.conflicts += conflicts;

        changes
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom as _;
    use rand::SeedableRng as _;

    use super::*;
    use crate::core::Strand;
    use crate::liftover;
    use crate::orf::Assembly;
    use crate::orf::NewRawOrf;
    use crate::orf::SourceId;
    use crate::store::Memory;
    use crate::testing;

    fn lifted(store: &mut Memory, source: &str, start: u64, stop: u64) -> RawOrf {
        let locus = Locus::try_new("1", Strand::Positive, start, stop, vec![], vec![]).unwrap();
        let id = store
            .insert_raw(NewRawOrf::new(
                SourceId::new(source),
                Assembly::new("GRCh38"),
                locus.clone(),
            ))
            .unwrap();
        store
            .set_liftover(id, Liftover::Mapped { locus, length_diff: 0 })
            .unwrap();
        store.raw(id).unwrap().unwrap()
    }

    #[test]
    fn test_two_sources_merge_into_one_orf() -> Result<(), Box<dyn std::error::Error>> {
        let annotation = testing::annotation();
        let sequence = testing::sequence();
        let policy = RetryPolicy::none();
        let services = Services {
            annotation: &annotation,
            sequence: &sequence,
            policy: &policy,
        };

        let mut store = Memory::default();
        let a = lifted(&mut store, "X", 100, 400);
        let b = lifted(&mut store, "Y", 100, 400);

        let mut engine = Engine::new();
        let prepared = prepare(&store, &services, &[a.clone(), b.clone()])?;
        let changes = engine.stage(prepared);
        assert_eq!(changes.orfs.len(), 1);
        assert_eq!(changes.contributions.len(), 2);

        let committed = store.commit(changes)?;
        assert_eq!(committed.created, 1);
        assert_eq!(committed.merged, 2);

        let orf = store.orf_by_key(&a.locus().key())?.unwrap();
        assert_eq!(orf.genomic_length(), 300);
        assert_eq!(orf.count_ds(), 2);
        assert_eq!(orf.count_ds_ambiguous(), 0);
        assert_eq!(orf.protein().len(), 100);

        // A known key does not need its sequence again.
        let again = prepare(&store, &services, &[b])?;
        assert!(matches!(
            &again[0].outcome,
            Outcome::Ready { sequences: None, .. }
        ));

        Ok(())
    }

    #[test]
    fn test_failures_are_isolated_per_record() -> Result<(), Box<dyn std::error::Error>> {
        let annotation = testing::annotation();
        let sequence = testing::sequence();
        let policy = RetryPolicy::none();
        let services = Services {
            annotation: &annotation,
            sequence: &sequence,
            policy: &policy,
        };

        let mut store = Memory::default();
        let good = lifted(&mut store, "X", 100, 400);
        // No gene overlaps the end of the chromosome.
        let unresolved = lifted(&mut store, "X", 9_000, 9_300);
        // The reference sequence is shorter than this locus.
        let failing = lifted(&mut store, "X", 5_000, 20_000);
        let pending = {
            let locus = Locus::try_new("1", Strand::Positive, 100, 200, vec![], vec![])?;
            let id = store.insert_raw(NewRawOrf::new(
                SourceId::new("Y"),
                Assembly::new("GRCh37"),
                locus,
            ))?;
            store.raw(id)?.unwrap()
        };

        let mut engine = Engine::new();
        let prepared = prepare(&store, &services, &[good, unresolved, failing, pending])?;
        let changes = engine.stage(prepared);

        assert_eq!(changes.contributions.len(), 1);
        assert_eq!(
            *engine.report(),
            Report {
                unresolved: 1,
                failed: 1,
                skipped: 1,
                ..Default::default()
            }
        );

        Ok(())
    }

    /// A raw ORF to insert: source, start, stop, and splice structure.
    type Fixture = (&'static str, u64, u64, Vec<u64>, Vec<u64>);

    /// Raw ORFs from three sources, with duplicates across sources and one
    /// locus that overlaps two genes.
    fn fixtures() -> Vec<Fixture> {
        vec![
            ("X", 100, 400, vec![], vec![]),
            ("Y", 100, 400, vec![], vec![]),
            ("Z", 100, 400, vec![], vec![]),
            ("X", 600, 900, vec![600, 800], vec![700, 900]),
            ("Y", 600, 900, vec![600, 800], vec![700, 900]),
            ("X", 3500, 3800, vec![], vec![]),
            ("Y", 3500, 3800, vec![], vec![]),
            ("Z", 5100, 5400, vec![], vec![]),
            ("Z", 9100, 9400, vec![], vec![]),
        ]
    }

    fn insert_all(store: &mut Memory, fixtures: &[Fixture]) -> Vec<RawOrfId> {
        fixtures
            .iter()
            .map(|(source, start, stop, starts, ends)| {
                let locus = Locus::try_new(
                    "1",
                    Strand::Positive,
                    *start,
                    *stop,
                    starts.clone(),
                    ends.clone(),
                )
                .unwrap();
                let id = store
                    .insert_raw(NewRawOrf::new(
                        SourceId::new(*source),
                        Assembly::new("GRCh38"),
                        locus.clone(),
                    ))
                    .unwrap();
                store
                    .set_liftover(id, Liftover::Mapped { locus, length_diff: 0 })
                    .unwrap();
                id
            })
            .collect()
    }

    /// Merges every unmerged raw ORF, `batch` at a time.
    fn merge_all(
        store: &mut Memory,
        services: &Services<'_>,
        batch: usize,
    ) -> Result<Report, Box<dyn std::error::Error>> {
        let mut engine = Engine::new();
        let mut report = Report::default();

        for ids in store.unmerged()?.chunks(batch) {
            let raws = ids
                .iter()
                .map(|id| store.raw(*id).map(Option::unwrap))
                .collect::<store::Result<Vec<_>>>()?;
            let changes = engine.stage(prepare(&*store, services, &raws)?);
            report.record(&store.commit(changes)?);
        }

        report.add(engine.report());
        Ok(report)
    }

    /// The canonical graph, independent of store identifiers.
    type State = BTreeMap<Key, (u64, u64, Vec<(String, bool, usize)>)>;

    fn state(store: &Memory) -> Result<State, Box<dyn std::error::Error>> {
        let mut state = State::new();

        for orf in store.orf_page(None, usize::MAX)? {
            let associations = store
                .associations(orf.id())?
                .iter()
                .map(|a| (a.transcript().to_string(), a.conflict(), a.provenance().len()))
                .collect();

            state.insert(
                orf.key(),
                (orf.count_ds(), orf.count_ds_ambiguous(), associations),
            );
        }

        Ok(state)
    }

    #[test]
    fn test_merging_is_order_independent() -> Result<(), Box<dyn std::error::Error>> {
        let annotation = testing::annotation();
        let sequence = testing::sequence();
        let policy = RetryPolicy::none();
        let services = Services {
            annotation: &annotation,
            sequence: &sequence,
            policy: &policy,
        };

        let mut expected = Memory::default();
        insert_all(&mut expected, &fixtures());
        merge_all(&mut expected, &services, 100)?;
        let expected = state(&expected)?;

        // One ORF per distinct key, except the unannotated one.
        assert_eq!(expected.len(), 4);

        let mut rng = StdRng::seed_from_u64(0x0f);
        for batch in [1, 2, 4] {
            let mut shuffled = fixtures();
            shuffled.shuffle(&mut rng);

            let mut store = Memory::default();
            insert_all(&mut store, &shuffled);
            merge_all(&mut store, &services, batch)?;

            assert_eq!(state(&store)?, expected);
            assert_eq!(store.conflicts()?.len(), 2);
        }

        Ok(())
    }

    #[test]
    fn test_merging_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let annotation = testing::annotation();
        let sequence = testing::sequence();
        let policy = RetryPolicy::none();
        let services = Services {
            annotation: &annotation,
            sequence: &sequence,
            policy: &policy,
        };

        let mut store = Memory::default();
        let ids = insert_all(&mut store, &fixtures());

        let first = merge_all(&mut store, &services, 3)?;
        assert_eq!(first.merged, 8);
        assert_eq!(first.created, 4);
        assert_eq!(first.unresolved, 1);
        let before = state(&store)?;

        // Only the unannotated raw ORF is left, and it stays unmerged.
        assert_eq!(store.unmerged()?, vec![ids[8]]);
        let second = merge_all(&mut store, &services, 3)?;
        assert_eq!(second.merged, 0);
        assert_eq!(second.unresolved, 1);

        // Replaying a batch that was already committed changes nothing.
        let raws = ids[..3]
            .iter()
            .map(|id| store.raw(*id).map(Option::unwrap))
            .collect::<store::Result<Vec<_>>>()?;
        let changes = Engine::new().stage(prepare(&store, &services, &raws)?);
        let committed = store.commit(changes)?;
        assert_eq!(committed.merged, 0);
        assert_eq!(committed.duplicates, 3);

        assert_eq!(state(&store)?, before);

        // Canonical keys stay unique.
        let orfs = store.orf_page(None, usize::MAX)?;
        let keys = orfs.iter().map(|o| o.key()).collect::<std::collections::BTreeSet<_>>();
        assert_eq!(keys.len(), orfs.len());

        Ok(())
    }

    #[test]
    fn test_ambiguous_raw_orfs_raise_one_conflict() -> Result<(), Box<dyn std::error::Error>> {
        let annotation = testing::annotation();
        let sequence = testing::sequence();
        let policy = RetryPolicy::none();
        let services = Services {
            annotation: &annotation,
            sequence: &sequence,
            policy: &policy,
        };

        let mut store = Memory::default();
        let ambiguous = lifted(&mut store, "X", 3500, 3800);

        let report = merge_all(&mut store, &services, 10)?;
        assert_eq!(report.conflicts, 1);

        let orf = store.orf_by_key(&ambiguous.locus().key())?.unwrap();
        assert_eq!(orf.count_ds(), 1);
        assert_eq!(orf.count_ds_ambiguous(), 1);

        let associations = store.associations(orf.id())?;
        assert_eq!(associations.len(), 2);
        assert!(associations.iter().all(|a| a.conflict()));
        assert_eq!(
            associations.iter().map(|a| a.gene()).collect::<Vec<_>>(),
            vec!["G2", "G3"]
        );

        let conflicts = store.conflicts()?;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].raw, ambiguous.id());
        assert_eq!(conflicts[0].genes.len(), 2);

        // Reporting the gene settles the ambiguity.
        let locus = Locus::try_new("1", Strand::Positive, 3500, 3800, vec![], vec![])?;
        let id = store.insert_raw(
            NewRawOrf::new(SourceId::new("Y"), Assembly::new("GRCh38"), locus.clone())
                .with_gene("OLD"),
        )?;
        store.set_liftover(id, Liftover::Mapped { locus, length_diff: 0 })?;
        merge_all(&mut store, &services, 10)?;

        let orf = store.orf(orf.id())?.unwrap();
        assert_eq!(orf.count_ds(), 2);
        assert_eq!(orf.count_ds_ambiguous(), 1);
        assert_eq!(store.conflicts()?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_unlifted_spliced_orfs_contribute_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let annotation = testing::annotation();
        let sequence = testing::sequence();
        let policy = RetryPolicy::none();
        let services = Services {
            annotation: &annotation,
            sequence: &sequence,
            policy: &policy,
        };

        let mut store = Memory::default();
        let locus = Locus::try_new("1", Strand::Positive, 600, 900, vec![600, 800], vec![700, 900])?;
        let id = store.insert_raw(NewRawOrf::new(
            SourceId::new("X"),
            Assembly::new("GRCh37"),
            locus,
        ))?;

        // Only the last base of the second exon fails to map.
        let oracle = testing::ShiftOracle::new(0).with_gap(899, 900);
        let raw = store.raw(id)?.unwrap();
        let outcome = liftover::lift_raw(&oracle, &policy, &raw, &Assembly::new("GRCh38"));
        assert!(!outcome.succeeded());
        store.set_liftover(id, outcome)?;

        let report = merge_all(&mut store, &services, 10)?;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.merged, 0);
        assert!(store.orf_page(None, 10)?.is_empty());
        assert_eq!(store.merged_into(id)?, None);

        Ok(())
    }

    #[test]
    fn test_worked_example() -> Result<(), Box<dyn std::error::Error>> {
        let annotation = testing::annotation();
        let sequence = testing::sequence();
        let policy = RetryPolicy::none();
        let services = Services {
            annotation: &annotation,
            sequence: &sequence,
            policy: &policy,
        };

        let mut store = Memory::default();
        let grch38 = Assembly::new("GRCh38");
        let locus = Locus::try_new("1", Strand::Positive, 100, 400, vec![], vec![])?;

        let a = store.insert_raw(NewRawOrf::new(SourceId::new("X"), grch38.clone(), locus.clone()))?;
        let raw = store.raw(a)?.unwrap();
        store.set_liftover(a, liftover::lift_raw(&liftover::Identity, &policy, &raw, &grch38))?;
        merge_all(&mut store, &services, 10)?;

        let orf = store.orf_by_key(&locus.key())?.unwrap();
        assert_eq!(orf.genomic_length(), 300);
        assert_eq!(orf.count_ds(), 1);

        let b = store.insert_raw(NewRawOrf::new(SourceId::new("Y"), grch38.clone(), locus.clone()))?;
        let raw = store.raw(b)?.unwrap();
        store.set_liftover(b, liftover::lift_raw(&liftover::Identity, &policy, &raw, &grch38))?;
        let report = merge_all(&mut store, &services, 10)?;
        assert_eq!(report.created, 0);

        let orfs = store.orf_page(None, 10)?;
        assert_eq!(orfs.len(), 1);
        assert_eq!(orfs[0].count_ds(), 2);

        // Removing a source keeps the ORF with one less contribution.
        store.remove_source(&SourceId::new("X"))?;
        assert_eq!(store.orf(orf.id())?.unwrap().count_ds(), 1);

        Ok(())
    }
}
