//! A (possibly spliced) genomic locus and the identity key derived from it.
//!
//! Positions are 0-based and half-open: `start` is the first base of the
//! locus and `stop` is one past the last base. A spliced locus additionally
//! carries the boundaries of each exon, normalized ascending by start.

use nonempty::NonEmpty;
use serde::Deserialize;
use serde::Serialize;

use crate::core::Strand;

/// A 0-based position upon a chromosome.
pub type Position = u64;

/// An error related to the construction of a [`Locus`].
#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// The locus does not cover at least one base.
    EmptyLocus(Position, Position),

    /// The number of splice starts does not match the number of splice ends.
    SpliceCountMismatch(usize, usize),

    /// An exon does not cover at least one base.
    EmptyExon(Exon),

    /// Two exons overlap one another.
    OverlappingExons(Exon, Exon),

    /// An exon falls outside of the locus bounds.
    ExonOutOfBounds(Exon),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::EmptyLocus(start, stop) => {
                write!(f, "locus must span at least one base: {start}-{stop}")
            }
            Error::SpliceCountMismatch(starts, ends) => write!(
                f,
                "number of splice starts ({starts}) does not match number of splice ends ({ends})"
            ),
            Error::EmptyExon(exon) => write!(f, "exon must span at least one base: {exon}"),
            Error::OverlappingExons(a, b) => write!(f, "exons overlap: {a} and {b}"),
            Error::ExonOutOfBounds(exon) => write!(f, "exon falls outside of locus: {exon}"),
        }
    }
}

impl std::error::Error for Error {}

/// A contiguous block of a locus.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct Exon {
    /// The first base of the exon.
    start: Position,

    /// One past the last base of the exon.
    end: Position,
}

impl Exon {
    /// Creates a new [`Exon`].
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::core::Exon;
    ///
    /// let exon = Exon::new(10, 20);
    /// assert_eq!(exon.len(), 10);
    /// ```
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Gets the first base of the exon.
    pub fn start(&self) -> Position {
        self.start
    }

    /// Gets the position one past the last base of the exon.
    pub fn end(&self) -> Position {
        self.end
    }

    /// Gets the number of bases covered by the exon.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

impl std::fmt::Display for Exon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A genomic locus, optionally made up of multiple exons.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Locus {
    /// The chromosome name.
    chromosome: String,

    /// The strand.
    strand: Strand,

    /// The first base of the locus.
    start: Position,

    /// One past the last base of the locus.
    stop: Position,

    /// The exon starts (empty when the locus is unspliced).
    splice_starts: Vec<Position>,

    /// The exon ends (empty when the locus is unspliced).
    splice_ends: Vec<Position>,
}

impl Locus {
    /// Attempts to create a new [`Locus`].
    ///
    /// The splice boundaries are sorted ascending by exon start before they
    /// are validated. Pass empty vectors for an unspliced locus.
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::core::Locus;
    /// use orfdb::core::Strand;
    ///
    /// let locus = Locus::try_new("1", Strand::Positive, 100, 400, vec![300, 100], vec![400, 200])?;
    ///
    /// assert!(locus.spliced());
    /// assert_eq!(locus.splice_starts(), &[100, 300]);
    /// assert_eq!(locus.splice_ends(), &[200, 400]);
    /// assert_eq!(locus.genomic_length(), 200);
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn try_new(
        chromosome: impl Into<String>,
        strand: Strand,
        start: Position,
        stop: Position,
        splice_starts: Vec<Position>,
        splice_ends: Vec<Position>,
    ) -> Result<Self, Error> {
        if start >= stop {
            return Err(Error::EmptyLocus(start, stop));
        }

        if splice_starts.len() != splice_ends.len() {
            return Err(Error::SpliceCountMismatch(
                splice_starts.len(),
                splice_ends.len(),
            ));
        }

        let mut exons = splice_starts
            .into_iter()
            .zip(splice_ends)
            .map(|(start, end)| Exon::new(start, end))
            .collect::<Vec<_>>();
        exons.sort();

        for exon in &exons {
            if exon.start >= exon.end {
                return Err(Error::EmptyExon(*exon));
            }

            if exon.start < start || exon.end > stop {
                return Err(Error::ExonOutOfBounds(*exon));
            }
        }

        for pair in exons.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(Error::OverlappingExons(pair[0], pair[1]));
            }
        }

        let (splice_starts, splice_ends) = exons.into_iter().map(|e| (e.start, e.end)).unzip();

        Ok(Self {
            chromosome: chromosome.into(),
            strand,
            start,
            stop,
            splice_starts,
            splice_ends,
        })
    }

    /// Attempts to create a new [`Locus`] spanning the provided exons.
    ///
    /// The bounds of the locus are the outermost exon boundaries. When
    /// `spliced` is `false`, only the bounds are kept.
    pub fn from_exons(
        chromosome: impl Into<String>,
        strand: Strand,
        exons: NonEmpty<Exon>,
        spliced: bool,
    ) -> Result<Self, Error> {
        let start = exons.iter().map(|e| e.start).min().unwrap_or(exons.head.start);
        let stop = exons.iter().map(|e| e.end).max().unwrap_or(exons.head.end);

        let (splice_starts, splice_ends) = match spliced {
            true => exons.into_iter().map(|e| (e.start, e.end)).unzip(),
            false => (Vec::new(), Vec::new()),
        };

        Self::try_new(chromosome, strand, start, stop, splice_starts, splice_ends)
    }

    /// Gets the chromosome name.
    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    /// Gets the strand.
    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// Gets the first base of the locus.
    pub fn start(&self) -> Position {
        self.start
    }

    /// Gets the position one past the last base of the locus.
    pub fn stop(&self) -> Position {
        self.stop
    }

    /// Whether or not the locus is spliced.
    pub fn spliced(&self) -> bool {
        !self.splice_starts.is_empty()
    }

    /// Gets the exon starts (ascending).
    pub fn splice_starts(&self) -> &[Position] {
        &self.splice_starts
    }

    /// Gets the exon ends (ascending).
    pub fn splice_ends(&self) -> &[Position] {
        &self.splice_ends
    }

    /// Gets the number of contiguous parts of the locus.
    pub fn parts(&self) -> usize {
        self.splice_starts.len().max(1)
    }

    /// Gets the exons of the locus. An unspliced locus has exactly one exon.
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::core::Exon;
    /// use orfdb::core::Locus;
    /// use orfdb::core::Strand;
    ///
    /// let locus = Locus::try_new("1", Strand::Negative, 100, 400, vec![], vec![])?;
    /// assert_eq!(locus.exons().len(), 1);
    /// assert_eq!(locus.exons().head, Exon::new(100, 400));
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn exons(&self) -> NonEmpty<Exon> {
        let exons = self
            .splice_starts
            .iter()
            .zip(&self.splice_ends)
            .map(|(start, end)| Exon::new(*start, *end))
            .collect::<Vec<_>>();

        NonEmpty::from_vec(exons).unwrap_or_else(|| NonEmpty::new(Exon::new(self.start, self.stop)))
    }

    /// Gets the number of bases covered by the exons of the locus.
    pub fn genomic_length(&self) -> u64 {
        self.exons().iter().map(Exon::len).sum()
    }

    /// Gets the identity [`Key`] of the locus.
    pub fn key(&self) -> Key {
        Key {
            chromosome: self.chromosome.clone(),
            strand: self.strand,
            start: self.start,
            stop: self.stop,
            spliced: self.spliced(),
            splice_starts: self.splice_starts.clone(),
            splice_ends: self.splice_ends.clone(),
            parts: self.parts(),
        }
    }
}

impl std::fmt::Display for Locus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}",
            self.chromosome, self.strand, self.start, self.stop
        )?;

        if self.spliced() {
            let exons = self
                .exons()
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>();
            write!(f, "[{}]", exons.join(","))?;
        }

        Ok(())
    }
}

/// The identity of a locus.
///
/// Two loci with equal keys describe the same genomic feature. No positional
/// tolerance is applied: every field is compared exactly. Hashing only
/// involves the fields of the key.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Key {
    /// The chromosome name.
    pub chromosome: String,
    /// The strand.
    pub strand: Strand,
    /// The first base.
    pub start: Position,
    /// One past the last base.
    pub stop: Position,
    /// Whether the locus is spliced.
    pub spliced: bool,
    /// The exon starts.
    pub splice_starts: Vec<Position>,
    /// The exon ends.
    pub splice_ends: Vec<Position>,
    /// The number of parts.
    pub parts: usize,
}

impl Key {
    /// Rebuilds the [`Locus`] this key was derived from.
    pub fn to_locus(&self) -> Locus {
        Locus {
            chromosome: self.chromosome.clone(),
            strand: self.strand,
            start: self.start,
            stop: self.stop,
            splice_starts: self.splice_starts.clone(),
            splice_ends: self.splice_ends.clone(),
        }
    }
}

impl From<&Locus> for Key {
    fn from(locus: &Locus) -> Self {
        locus.key()
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_locus())
    }
}
