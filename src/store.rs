//! The repository layer for raw, canonical, and derived records.
//!
//! A [`Store`] holds three namespaces:
//!
//! - the raw namespace: [`RawOrf`]s, unique by (source, raw locus);
//! - the canonical namespace: [`CanonicalOrf`]s (unique by locus key),
//!   their [`Association`]s (unique by ORF and transcript) and
//!   [`GeneConflict`]s (unique by raw ORF);
//! - the derived namespace: the canonical ORFs selected by a filter.
//!
//! It also keeps the [`Checkpoint`] of the last merge run.
//!
//! All writes to the canonical namespace go through [`Store::commit()`],
//! which applies a [`Changeset`] as a whole or not at all.

use std::collections::BTreeMap;

use crate::annotation::Target;
use crate::core::Key;
use crate::core::Locus;
use crate::driver::Checkpoint;
use crate::orf::Association;
use crate::orf::CanonicalOrf;
use crate::orf::GeneConflict;
use crate::orf::Liftover;
use crate::orf::NewRawOrf;
use crate::orf::OrfId;
use crate::orf::RawOrf;
use crate::orf::RawOrfId;
use crate::orf::SourceId;
use crate::service::Transient;

pub mod memory;
pub mod snapshot;

pub use memory::Memory;

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to a [`Store`].
#[derive(Debug)]
pub enum Error {
    /// A record with the same identity key already exists.
    DuplicateKey(String),

    /// A referenced record does not exist.
    Missing(String),

    /// A failure that may go away on retry (for example, lock contention).
    Transient(String),

    /// A failure that will not go away on retry.
    Permanent(String),

    /// The store could not be read from or written to disk.
    Snapshot(snapshot::Error),
}

impl Error {
    /// Whether or not the failed operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DuplicateKey(key) => write!(f, "duplicate key: {key}"),
            Error::Missing(what) => write!(f, "missing record: {what}"),
            Error::Transient(msg) => write!(f, "transient storage error: {msg}"),
            Error::Permanent(msg) => write!(f, "storage error: {msg}"),
            Error::Snapshot(err) => write!(f, "snapshot error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl Transient for Error {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// A [`Result`](std::result::Result) with an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Changesets
////////////////////////////////////////////////////////////////////////////////////////

/// A canonical ORF to create unless its key already exists.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewOrf {
    /// The locus on the current assembly.
    pub locus: Locus,

    /// The nucleotide sequence.
    pub sequence: String,

    /// The amino-acid sequence.
    pub protein: String,
}

/// One raw ORF merging into a canonical ORF.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Contribution {
    /// The raw ORF.
    pub raw: RawOrfId,

    /// The key of the canonical ORF.
    pub key: Key,

    /// The transcripts to associate (never empty).
    pub targets: Vec<Target>,

    /// The gene conflict, if the raw ORF resolved to more than one gene.
    pub conflict: Option<GeneConflict>,
}

/// A set of canonical writes that is committed atomically.
#[derive(Clone, Debug, Default)]
pub struct Changeset {
    /// Canonical ORFs to create, by key.
    pub orfs: BTreeMap<Key, NewOrf>,

    /// The raw ORFs to merge.
    pub contributions: Vec<Contribution>,

    /// The checkpoint to record alongside the changes.
    pub checkpoint: Option<Checkpoint>,
}

impl Changeset {
    /// Whether or not the changeset writes nothing.
    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty() && self.checkpoint.is_none()
    }
}

/// What a commit changed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Committed {
    /// The number of canonical ORFs created.
    pub created: usize,

    /// The number of raw ORFs merged.
    pub merged: usize,

    /// The number of contributions ignored because the raw ORF was already
    /// merged.
    pub duplicates: usize,
}

////////////////////////////////////////////////////////////////////////////////////////
// Store
////////////////////////////////////////////////////////////////////////////////////////

/// The repository layer.
pub trait Store: Send + Sync {
    /// Inserts a new raw ORF. Fails with [`Error::DuplicateKey`] if a raw ORF
    /// with the same identity key exists.
    fn insert_raw(&mut self, orf: NewRawOrf) -> Result<RawOrfId>;

    /// Inserts a new raw ORF unless one with the same identity key exists.
    /// Returns the identifier and whether or not a record was inserted.
    fn get_or_insert_raw(&mut self, orf: NewRawOrf) -> Result<(RawOrfId, bool)>;

    /// Gets a raw ORF.
    fn raw(&self, id: RawOrfId) -> Result<Option<RawOrf>>;

    /// Gets up to `limit` raw ORFs with identifiers greater than `after`, in
    /// ascending order.
    fn raw_page(&self, after: Option<RawOrfId>, limit: usize) -> Result<Vec<RawOrf>>;

    /// Records the liftover outcome of a raw ORF.
    fn set_liftover(&mut self, id: RawOrfId, liftover: Liftover) -> Result<()>;

    /// Gets the raw ORFs that are not yet part of any association, in
    /// ascending order.
    fn unmerged(&self) -> Result<Vec<RawOrfId>>;

    /// Gets the canonical ORF a raw ORF was merged into.
    fn merged_into(&self, raw: RawOrfId) -> Result<Option<OrfId>>;

    /// Gets a canonical ORF.
    fn orf(&self, id: OrfId) -> Result<Option<CanonicalOrf>>;

    /// Gets a canonical ORF by identity key.
    fn orf_by_key(&self, key: &Key) -> Result<Option<CanonicalOrf>>;

    /// Gets up to `limit` canonical ORFs with identifiers greater than
    /// `after`, in ascending order.
    fn orf_page(&self, after: Option<OrfId>, limit: usize) -> Result<Vec<CanonicalOrf>>;

    /// Gets the associations of a canonical ORF, ordered by transcript.
    fn associations(&self, orf: OrfId) -> Result<Vec<Association>>;

    /// Gets every gene conflict, ordered by raw ORF.
    fn conflicts(&self) -> Result<Vec<GeneConflict>>;

    /// Applies a changeset as a whole or not at all.
    fn commit(&mut self, changes: Changeset) -> Result<Committed>;

    /// Stores the reconciled coordinates and the score of an existing
    /// association. Provenance and the conflict flag belong to merging and
    /// are not changed.
    fn update_association(&mut self, association: &Association) -> Result<()>;

    /// Removes every raw ORF of a source. Canonical ORFs are kept, but lose
    /// the contributions of the removed raw ORFs. Returns the number of raw
    /// ORFs removed.
    fn remove_source(&mut self, source: &SourceId) -> Result<usize>;

    /// Replaces the contents of the derived namespace.
    fn replace_filtered(&mut self, orfs: Vec<OrfId>) -> Result<()>;

    /// Gets the contents of the derived namespace, in ascending order.
    fn filtered(&self) -> Result<Vec<OrfId>>;

    /// Gets the checkpoint of the last merge run.
    fn checkpoint(&self) -> Result<Option<Checkpoint>>;

    /// Records a checkpoint on its own.
    fn save_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<()> {
        self.commit(Changeset {
            checkpoint: Some(checkpoint),
            ..Default::default()
        })
        .map(|_| ())
    }

    /// Makes every write so far durable.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
