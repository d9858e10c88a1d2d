//! Lines within a chain file.
//!
//! A chain file is made up of sections. Each section starts with a header
//! line (`chain score tName tSize tStrand tStart tEnd qName qSize qStrand
//! qStart qEnd id`) followed by alignment data lines (`size dt dq`), the last
//! of which only carries a `size`.

use std::num::ParseIntError;
use std::str::FromStr;

use crate::core::strand::ParseStrandError;
use crate::core::Position;
use crate::core::Strand;

/// The prefix for a header line.
pub const HEADER_PREFIX: &str = "chain";

/// The number of expected fields in a header line.
pub const NUM_HEADER_FIELDS: usize = 13;

/// The number of expected fields in a non-terminating alignment data line.
pub const NUM_BLOCK_FIELDS_NONTERMINATING: usize = 3;

/// The number of expected fields in a terminating alignment data line.
pub const NUM_BLOCK_FIELDS_TERMINATING: usize = 1;

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error associated with parsing one side of a header line.
#[derive(Debug)]
pub enum SequenceError {
    /// An invalid chromosome size.
    InvalidChromosomeSize(ParseIntError),
    /// An invalid strand.
    InvalidStrand(ParseStrandError),
    /// An invalid alignment start.
    InvalidAlignmentStart(ParseIntError),
    /// An invalid alignment end.
    InvalidAlignmentEnd(ParseIntError),
    /// The alignment end exceeds the chromosome size.
    EndExceedsSize(String, Position, Position),
}

impl std::fmt::Display for SequenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceError::InvalidChromosomeSize(err) => {
                write!(f, "invalid chromosome size: {err}")
            }
            SequenceError::InvalidStrand(err) => write!(f, "invalid strand: {err}"),
            SequenceError::InvalidAlignmentStart(err) => {
                write!(f, "invalid alignment start: {err}")
            }
            SequenceError::InvalidAlignmentEnd(err) => write!(f, "invalid alignment end: {err}"),
            SequenceError::EndExceedsSize(chromosome, end, size) => write!(
                f,
                "the end position ({end}) exceeds the size of the chromosome {chromosome} ({size})"
            ),
        }
    }
}

impl std::error::Error for SequenceError {}

/// An error associated with parsing a line of a chain file.
#[derive(Debug)]
pub enum ParseError {
    /// An incorrect number of fields in a header line.
    IncorrectNumberOfHeaderFields(usize),
    /// An invalid score.
    InvalidScore(ParseIntError),
    /// An invalid reference sequence.
    InvalidReferenceSequence(SequenceError),
    /// An invalid query sequence.
    InvalidQuerySequence(SequenceError),
    /// An invalid id.
    InvalidId(ParseIntError),
    /// The reference sequence is on the negative strand.
    NegativeReferenceStrand,
    /// An incorrect number of fields in an alignment data line.
    IncorrectNumberOfBlockFields(usize),
    /// An invalid block size.
    InvalidSize(ParseIntError),
    /// An invalid dt.
    InvalidDt(ParseIntError),
    /// An invalid dq.
    InvalidDq(ParseIntError),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::IncorrectNumberOfHeaderFields(n) => write!(
                f,
                "invalid number of fields in header: expected {NUM_HEADER_FIELDS} fields, found \
                 {n} fields"
            ),
            ParseError::InvalidScore(err) => write!(f, "invalid score: {err}"),
            ParseError::InvalidReferenceSequence(err) => {
                write!(f, "invalid reference sequence: {err}")
            }
            ParseError::InvalidQuerySequence(err) => write!(f, "invalid query sequence: {err}"),
            ParseError::InvalidId(err) => write!(f, "invalid id: {err}"),
            ParseError::NegativeReferenceStrand => {
                write!(f, "reference sequences must be on the positive strand")
            }
            ParseError::IncorrectNumberOfBlockFields(n) => write!(
                f,
                "invalid number of fields in alignment data: expected \
                 {NUM_BLOCK_FIELDS_NONTERMINATING} (non-terminating) or \
                 {NUM_BLOCK_FIELDS_TERMINATING} (terminating) fields, found {n} fields"
            ),
            ParseError::InvalidSize(err) => write!(f, "invalid size: {err}"),
            ParseError::InvalidDt(err) => write!(f, "invalid dt: {err}"),
            ParseError::InvalidDq(err) => write!(f, "invalid dq: {err}"),
        }
    }
}

impl std::error::Error for ParseError {}

////////////////////////////////////////////////////////////////////////////////////////
// Header
////////////////////////////////////////////////////////////////////////////////////////

/// One side (reference or query) of a header line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sequence {
    /// The chromosome name.
    pub chromosome: String,
    /// The chromosome size.
    pub size: Position,
    /// The strand.
    pub strand: Strand,
    /// The start of the alignment (in strand coordinates).
    pub start: Position,
    /// The end of the alignment (in strand coordinates).
    pub end: Position,
}

impl Sequence {
    /// Attempts to parse a sequence from its five fields.
    fn parse(fields: &[&str]) -> Result<Self, SequenceError> {
        let sequence = Self {
            chromosome: fields[0].to_string(),
            size: fields[1]
                .parse()
                .map_err(SequenceError::InvalidChromosomeSize)?,
            strand: fields[2].parse().map_err(SequenceError::InvalidStrand)?,
            start: fields[3]
                .parse()
                .map_err(SequenceError::InvalidAlignmentStart)?,
            end: fields[4].parse().map_err(SequenceError::InvalidAlignmentEnd)?,
        };

        if sequence.end > sequence.size {
            return Err(SequenceError::EndExceedsSize(
                sequence.chromosome,
                sequence.end,
                sequence.size,
            ));
        }

        Ok(sequence)
    }
}

/// A header line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// The chain score.
    pub score: u64,
    /// The reference (target) sequence.
    pub reference: Sequence,
    /// The query sequence.
    pub query: Sequence,
    /// The chain id.
    pub id: u64,
}

impl FromStr for Header {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split_whitespace().collect::<Vec<_>>();
        if parts.len() != NUM_HEADER_FIELDS || parts[0] != HEADER_PREFIX {
            return Err(ParseError::IncorrectNumberOfHeaderFields(parts.len()));
        }

        let score = parts[1].parse().map_err(ParseError::InvalidScore)?;
        let reference =
            Sequence::parse(&parts[2..7]).map_err(ParseError::InvalidReferenceSequence)?;
        let query = Sequence::parse(&parts[7..12]).map_err(ParseError::InvalidQuerySequence)?;
        let id = parts[12].parse().map_err(ParseError::InvalidId)?;

        if reference.strand == Strand::Negative {
            return Err(ParseError::NegativeReferenceStrand);
        }

        Ok(Self {
            score,
            reference,
            query,
            id,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Alignment data
////////////////////////////////////////////////////////////////////////////////////////

/// An alignment data line: an ungapped block followed by an optional gap.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    /// The size of the ungapped block.
    pub size: Position,
    /// The gaps to the next block in the reference and the query, if this is
    /// not the last block of the section.
    pub gaps: Option<(Position, Position)>,
}

impl FromStr for Block {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split_whitespace().collect::<Vec<_>>();
        let size = match parts.first() {
            Some(size) => size.parse().map_err(ParseError::InvalidSize)?,
            None => return Err(ParseError::IncorrectNumberOfBlockFields(0)),
        };

        let gaps = match parts.len() {
            NUM_BLOCK_FIELDS_TERMINATING => None,
            NUM_BLOCK_FIELDS_NONTERMINATING => {
                let dt = parts[1].parse().map_err(ParseError::InvalidDt)?;
                let dq = parts[2].parse().map_err(ParseError::InvalidDq)?;
                Some((dt, dq))
            }
            n => return Err(ParseError::IncorrectNumberOfBlockFields(n)),
        };

        Ok(Self { size, gaps })
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Lines
////////////////////////////////////////////////////////////////////////////////////////

/// A line within a chain file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Line {
    /// An empty line.
    Empty,
    /// A header line.
    Header(Header),
    /// An alignment data line.
    Block(Block),
}

impl FromStr for Line {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.is_empty() {
            Ok(Self::Empty)
        } else if s.starts_with(HEADER_PREFIX) {
            s.parse().map(Line::Header)
        } else {
            s.parse().map(Line::Block)
        }
    }
}
