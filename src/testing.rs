//! Fakes shared by the unit tests.

use crate::annotation::Index;
use crate::core::Key;
use crate::core::Locus;
use crate::core::Position;
use crate::core::Strand;
use crate::driver::Cancellation;
use crate::driver::Checkpoint;
use crate::liftover::Lifted;
use crate::liftover::Oracle;
use crate::orf::Assembly;
use crate::orf::Association;
use crate::orf::CanonicalOrf;
use crate::orf::GeneConflict;
use crate::orf::Liftover;
use crate::orf::NewRawOrf;
use crate::orf::OrfId;
use crate::orf::RawOrf;
use crate::orf::RawOrfId;
use crate::orf::SourceId;
use crate::sequence::Fasta;
use crate::service::ServiceError;
use crate::store;
use crate::store::Changeset;
use crate::store::Committed;
use crate::store::Store;

/// The length of chromosome `1` in [`sequence()`].
pub const CHROMOSOME_LENGTH: usize = 10_000;

/// An oracle that shifts positions by a fixed offset.
#[derive(Clone, Debug, Default)]
pub struct ShiftOracle {
    offset: Position,
    gap: Option<(Position, Position)>,
    step: Option<(Position, Position)>,
    unavailable: bool,
}

impl ShiftOracle {
    pub fn new(offset: Position) -> Self {
        Self {
            offset,
            ..Default::default()
        }
    }

    /// Positions in `[start, end)` do not map.
    pub fn with_gap(mut self, start: Position, end: Position) -> Self {
        self.gap = Some((start, end));
        self
    }

    /// Positions at or past `at` are shifted by `extra` more.
    pub fn with_step(mut self, at: Position, extra: Position) -> Self {
        self.step = Some((at, extra));
        self
    }

    /// Every request fails as if the service were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

impl Oracle for ShiftOracle {
    fn lift(
        &self,
        chromosome: &str,
        strand: Strand,
        position: Position,
        _: &Assembly,
        _: &Assembly,
    ) -> Result<Option<Lifted>, ServiceError> {
        if self.unavailable {
            return Err(ServiceError::Unavailable(String::from("oracle is down")));
        }

        if let Some((start, end)) = self.gap {
            if (start..end).contains(&position) {
                return Ok(None);
            }
        }

        let extra = match self.step {
            Some((at, extra)) if position >= at => extra,
            _ => 0,
        };

        Ok(Some(Lifted::new(
            chromosome,
            strand,
            position + self.offset + extra,
        )))
    }
}

/// A small annotation on chromosome `1`:
///
/// - `G1` (`ABC`, +): `T1` over 0..2000 and `T2` over 50..1500;
/// - `G2` (`DEF`, +): `T3` over 3000..4000, with `OLD` as an alias;
/// - `G3` (`GHI`, +): `T4` over 3500..5000, overlapping `T3`;
/// - `G4` (`JKL`, +): `T5` over 5000..8000;
/// - `G5` (`MNO`, -): `T6` over 0..2000.
///
/// Nothing is annotated past 8000.
pub fn annotation() -> Index {
    let gtf = [
        ("1", 1, 2000, "+", "G1", "ABC", "T1.1"),
        ("1", 51, 1500, "+", "G1", "ABC", "T2.1"),
        ("1", 3001, 4000, "+", "G2", "DEF", "T3.1"),
        ("1", 3501, 5000, "+", "G3", "GHI", "T4.1"),
        ("1", 5001, 8000, "+", "G4", "JKL", "T5.1"),
        ("1", 1, 2000, "-", "G5", "MNO", "T6.1"),
    ]
    .iter()
    .map(|(chromosome, start, end, strand, gene, name, transcript)| {
        format!(
            "{chromosome}\ttest\ttranscript\t{start}\t{end}\t.\t{strand}\t.\t\
             gene_id \"{gene}\"; gene_name \"{name}\"; transcript_id \"{transcript}\";\n"
        )
    })
    .collect::<String>();

    let aliases = "OLD\tDEF\n";

    Index::from_readers(gtf.as_bytes(), Some(aliases.as_bytes()))
        .expect("the test annotation to parse")
}

/// A reference with one chromosome, `1`, of [`CHROMOSOME_LENGTH`] bases.
pub fn sequence() -> Fasta {
    let mut state: u32 = 17;
    let bases = (0..CHROMOSOME_LENGTH)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            b"ACGT"[(state >> 16) as usize % 4]
        })
        .collect::<Vec<_>>();

    Fasta::from_sequences([("1", bases)])
}

/// Inserts `n` raw ORFs that are already lifted onto `GRCh38` and that all
/// resolve to `G1`. Every raw ORF has its own locus.
pub fn insert_lifted<S>(store: &mut S, n: usize) -> Vec<RawOrfId>
where
    S: Store,
{
    (0..n as u64)
        .map(|i| {
            let start = 100 + 30 * i;
            let locus = Locus::try_new("1", Strand::Positive, start, start + 90, vec![], vec![])
                .expect("a valid locus");

            let id = store
                .insert_raw(NewRawOrf::new(
                    SourceId::new("X"),
                    Assembly::new("GRCh38"),
                    locus.clone(),
                ))
                .expect("the raw ORF to be inserted");

            store
                .set_liftover(id, Liftover::Mapped { locus, length_diff: 0 })
                .expect("the liftover to be recorded");

            id
        })
        .collect()
}

/// A store that fails or interrupts a chosen commit.
#[derive(Debug)]
pub struct FailingStore<S> {
    inner: S,
    fail_at: Option<usize>,
    transient: bool,
    merge_commits: usize,
    interrupt: Option<(usize, Cancellation)>,
    stale_listing: bool,
}

impl<S> FailingStore<S>
where
    S: Store,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_at: None,
            transient: false,
            merge_commits: 0,
            interrupt: None,
            stale_listing: false,
        }
    }

    /// Fails the `nth` (1-based) commit attempt that merges anything, without
    /// applying it.
    pub fn fail_merge_commit(mut self, nth: usize, transient: bool) -> Self {
        self.fail_at = Some(nth);
        self.transient = transient;
        self
    }

    /// Cancels `cancellation` while the `nth` (1-based) commit that merges
    /// anything is in flight, as an interrupt arriving mid-batch would.
    pub fn interrupt_during_merge_commit(mut self, nth: usize, cancellation: Cancellation) -> Self {
        self.interrupt = Some((nth, cancellation));
        self
    }

    /// Lists every raw ORF as unmerged, as a listing taken before another
    /// process merged them would.
    pub fn with_stale_listing(mut self) -> Self {
        self.stale_listing = true;
        self
    }
}

impl<S> Store for FailingStore<S>
where
    S: Store,
{
    fn insert_raw(&mut self, orf: NewRawOrf) -> store::Result<RawOrfId> {
        self.inner.insert_raw(orf)
    }

    fn get_or_insert_raw(&mut self, orf: NewRawOrf) -> store::Result<(RawOrfId, bool)> {
        self.inner.get_or_insert_raw(orf)
    }

    fn raw(&self, id: RawOrfId) -> store::Result<Option<RawOrf>> {
        self.inner.raw(id)
    }

    fn raw_page(&self, after: Option<RawOrfId>, limit: usize) -> store::Result<Vec<RawOrf>> {
        self.inner.raw_page(after, limit)
    }

    fn set_liftover(&mut self, id: RawOrfId, liftover: Liftover) -> store::Result<()> {
        self.inner.set_liftover(id, liftover)
    }

    fn unmerged(&self) -> store::Result<Vec<RawOrfId>> {
        match self.stale_listing {
            true => Ok(self
                .inner
                .raw_page(None, usize::MAX)?
                .iter()
                .map(|raw| raw.id())
                .collect()),
            false => self.inner.unmerged(),
        }
    }

    fn merged_into(&self, raw: RawOrfId) -> store::Result<Option<OrfId>> {
        self.inner.merged_into(raw)
    }

    fn orf(&self, id: OrfId) -> store::Result<Option<CanonicalOrf>> {
        self.inner.orf(id)
    }

    fn orf_by_key(&self, key: &Key) -> store::Result<Option<CanonicalOrf>> {
        self.inner.orf_by_key(key)
    }

    fn orf_page(&self, after: Option<OrfId>, limit: usize) -> store::Result<Vec<CanonicalOrf>> {
        self.inner.orf_page(after, limit)
    }

    fn associations(&self, orf: OrfId) -> store::Result<Vec<Association>> {
        self.inner.associations(orf)
    }

    fn conflicts(&self) -> store::Result<Vec<GeneConflict>> {
        self.inner.conflicts()
    }

    fn commit(&mut self, changes: Changeset) -> store::Result<Committed> {
        if !changes.contributions.is_empty() {
            self.merge_commits += 1;

            if Some(self.merge_commits) == self.fail_at {
                let msg = format!("injected failure of commit {}", self.merge_commits);
                return Err(match self.transient {
                    true => store::Error::Transient(msg),
                    false => store::Error::Permanent(msg),
                });
            }

            if let Some((nth, cancellation)) = &self.interrupt {
                if *nth == self.merge_commits {
                    cancellation.cancel();
                }
            }
        }

        self.inner.commit(changes)
    }

    fn update_association(&mut self, association: &Association) -> store::Result<()> {
        self.inner.update_association(association)
    }

    fn remove_source(&mut self, source: &SourceId) -> store::Result<usize> {
        self.inner.remove_source(source)
    }

    fn replace_filtered(&mut self, orfs: Vec<OrfId>) -> store::Result<()> {
        self.inner.replace_filtered(orfs)
    }

    fn filtered(&self) -> store::Result<Vec<OrfId>> {
        self.inner.filtered()
    }

    fn checkpoint(&self) -> store::Result<Option<Checkpoint>> {
        self.inner.checkpoint()
    }

    fn flush(&mut self) -> store::Result<()> {
        self.inner.flush()
    }
}
