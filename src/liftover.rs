//! Facilities for lifting over raw ORFs onto the current assembly.
//!
//! The actual coordinate translation is delegated to an [`Oracle`], which
//! maps one base position from one assembly to another. Two oracles are
//! provided: [`Identity`] (for records that are already on the target
//! assembly) and [`chain::Chains`] (backed by UCSC chain files).
//!
//! Lifting a locus is all-or-nothing: every exon boundary is lifted on its
//! own, and the whole locus is rejected if any boundary fails to map or if the
//! boundaries land on different chromosomes or strands.

use crate::core::locus;
use crate::core::Exon;
use crate::core::Locus;
use crate::core::Position;
use crate::core::Strand;
use crate::orf::Assembly;
use crate::orf::Liftover;
use crate::orf::RawOrf;
use crate::service::RetryPolicy;
use crate::service::ServiceError;

pub mod chain;

/// A base position on a particular chromosome and strand.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lifted {
    /// The chromosome name.
    pub chromosome: String,

    /// The strand.
    pub strand: Strand,

    /// The 0-based position.
    pub position: Position,
}

impl Lifted {
    /// Creates a new [`Lifted`] position.
    pub fn new(chromosome: impl Into<String>, strand: Strand, position: Position) -> Self {
        Self {
            chromosome: chromosome.into(),
            strand,
            position,
        }
    }
}

/// An oracle that lifts single base positions between assemblies.
pub trait Oracle: Send + Sync {
    /// Lifts a base position from the `from` assembly to the `to` assembly.
    ///
    /// Returns `Ok(None)` if the position has no counterpart in the target
    /// assembly.
    fn lift(
        &self,
        chromosome: &str,
        strand: Strand,
        position: Position,
        from: &Assembly,
        to: &Assembly,
    ) -> std::result::Result<Option<Lifted>, ServiceError>;
}

/// An oracle that maps every position onto itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Oracle for Identity {
    fn lift(
        &self,
        chromosome: &str,
        strand: Strand,
        position: Position,
        _: &Assembly,
        _: &Assembly,
    ) -> std::result::Result<Option<Lifted>, ServiceError> {
        Ok(Some(Lifted::new(chromosome, strand, position)))
    }
}

/// An error related to lifting a locus.
#[derive(Debug)]
pub enum Error {
    /// A base position has no counterpart in the target assembly.
    Unmapped(String, Position),

    /// The lifted boundaries disagree on chromosome or strand.
    Inconsistent(String),

    /// The lifted boundaries do not form a valid locus.
    InvalidLocus(locus::Error),

    /// The oracle failed (after retries).
    Service(ServiceError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unmapped(chromosome, position) => {
                write!(f, "position {chromosome}:{position} does not map")
            }
            Error::Inconsistent(msg) => write!(f, "inconsistent liftover: {msg}"),
            Error::InvalidLocus(err) => write!(f, "lifted locus is invalid: {err}"),
            Error::Service(err) => write!(f, "liftover oracle failed: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

/// Lifts the first and last base of `exon`, returning the lifted exon and
/// where it landed.
fn lift_exon(
    oracle: &dyn Oracle,
    policy: &RetryPolicy,
    chromosome: &str,
    strand: Strand,
    exon: Exon,
    from: &Assembly,
    to: &Assembly,
) -> Result<(Exon, String, Strand)> {
    let lift = |position: Position| -> Result<Lifted> {
        policy
            .run("liftover", || oracle.lift(chromosome, strand, position, from, to))
            .map_err(Error::Service)?
            .ok_or_else(|| Error::Unmapped(chromosome.to_string(), position))
    };

    let first = lift(exon.start())?;
    let last = lift(exon.end() - 1)?;

    if first.chromosome != last.chromosome || first.strand != last.strand {
        return Err(Error::Inconsistent(format!(
            "exon {exon} maps to {}:{} and {}:{}",
            first.chromosome, first.strand, last.chromosome, last.strand
        )));
    }

    let start = first.position.min(last.position);
    let end = first.position.max(last.position) + 1;

    Ok((Exon::new(start, end), first.chromosome, first.strand))
}

/// Lifts every boundary of `locus` from the `from` assembly to the `to`
/// assembly.
///
/// # Examples
///
/// ```
/// use orfdb::core::Locus;
/// use orfdb::core::Strand;
/// use orfdb::liftover;
/// use orfdb::orf::Assembly;
/// use orfdb::service::RetryPolicy;
///
/// let locus = Locus::try_new("1", Strand::Positive, 100, 400, vec![100, 300], vec![200, 400])?;
/// let assembly = Assembly::new("GRCh38");
///
/// let lifted = liftover::lift_locus(
///     &liftover::Identity,
///     &RetryPolicy::none(),
///     &locus,
///     &assembly,
///     &assembly,
/// )?;
/// assert_eq!(lifted, locus);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn lift_locus(
    oracle: &dyn Oracle,
    policy: &RetryPolicy,
    locus: &Locus,
    from: &Assembly,
    to: &Assembly,
) -> Result<Locus> {
    let chromosome = locus.chromosome();
    let strand = locus.strand();

    let (bounds, target, target_strand) = lift_exon(
        oracle,
        policy,
        chromosome,
        strand,
        Exon::new(locus.start(), locus.stop()),
        from,
        to,
    )?;

    let mut exons = Vec::new();

    if locus.spliced() {
        for exon in locus.exons() {
            let (lifted, c, s) = lift_exon(oracle, policy, chromosome, strand, exon, from, to)?;

            if c != target || s != target_strand {
                return Err(Error::Inconsistent(format!(
                    "exon {exon} maps to {c}:{s}, but the locus maps to {target}:{target_strand}"
                )));
            }

            exons.push(lifted);
        }
    }

    let (splice_starts, splice_ends) = exons.iter().map(|e| (e.start(), e.end())).unzip();

    Locus::try_new(
        target,
        target_strand,
        bounds.start(),
        bounds.end(),
        splice_starts,
        splice_ends,
    )
    .map_err(Error::InvalidLocus)
}

/// Lifts a raw ORF onto the `to` assembly and returns its new liftover state.
///
/// Failures (including an oracle that keeps failing after retries) are
/// recorded in the returned state rather than returned as errors, so the
/// raw ORF can be retried later.
pub fn lift_raw(oracle: &dyn Oracle, policy: &RetryPolicy, raw: &RawOrf, to: &Assembly) -> Liftover {
    match lift_locus(oracle, policy, raw.locus(), raw.assembly(), to) {
        Ok(locus) => {
            let length_diff = raw.locus().genomic_length().abs_diff(locus.genomic_length());
            Liftover::Mapped { locus, length_diff }
        }
        Err(err) => Liftover::Failed {
            reason: err.to_string(),
        },
    }
}
