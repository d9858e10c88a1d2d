//! A machine for lifting over single base positions using a chain file.

use std::collections::HashMap;
use std::io::BufRead;

use rust_lapper as lapper;

use crate::core::Position;
use crate::core::Strand;
use crate::liftover::chain::reader;
use crate::liftover::chain::record::Header;
use crate::liftover::chain::record::Line;
use crate::liftover::chain::Reader;
use crate::liftover::Lifted;

/// An ungapped block of a chain, as seen from the query side.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    /// The query chromosome.
    chromosome: String,

    /// The size of the query chromosome.
    size: Position,

    /// The query strand.
    strand: Strand,

    /// The first query base of the block (in query strand coordinates).
    start: Position,

    /// The score of the chain the block belongs to.
    score: u64,

    /// The id of the chain the block belongs to.
    id: u64,
}

/// The inner value of the liftover lookup data structure.
type Iv = lapper::Interval<Position, Block>;

/// An error related to building a [`Machine`].
#[derive(Debug)]
pub enum Error {
    /// An error reading the chain file.
    Reader(reader::Error),

    /// An alignment data line appeared before any header.
    BlockOutsideSection,

    /// A header appeared before the previous section was terminated.
    UnterminatedSection(u64),

    /// The blocks of a section do not add up to the span in its header.
    MisalignedSection(u64),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Reader(err) => write!(f, "reader error: {err}"),
            Error::BlockOutsideSection => {
                write!(f, "alignment data found before any header")
            }
            Error::UnterminatedSection(id) => write!(f, "chain {id} is not terminated"),
            Error::MisalignedSection(id) => write!(
                f,
                "the blocks of chain {id} do not match the span given in its header"
            ),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

/// A section that is currently being read.
struct Open {
    /// The header of the section.
    header: Header,

    /// The next reference position.
    reference: Position,

    /// The next query position (in query strand coordinates).
    query: Position,
}

/// A builder for a [`Machine`].
#[derive(Debug, Default)]
pub struct Builder;

impl Builder {
    /// Builds a [`Machine`] from the chain file behind `reader`.
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::liftover::chain::machine::Builder;
    /// use orfdb::liftover::chain::Reader;
    ///
    /// let data = b"chain 0 seq0 4 + 0 4 seq0 5 - 0 5 1\n3\t0\t1\n1";
    /// let machine = Builder.try_build_from(Reader::new(&data[..]))?;
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn try_build_from<T>(&self, mut reader: Reader<T>) -> Result<Machine>
    where
        T: BufRead,
    {
        let mut hm = HashMap::<String, Vec<Iv>>::default();
        let mut open: Option<Open> = None;
        let mut buffer = String::new();

        while let Some(line) = reader.read_line(&mut buffer).map_err(Error::Reader)? {
            match line {
                Line::Empty => {}
                Line::Header(header) => {
                    if let Some(previous) = open {
                        return Err(Error::UnterminatedSection(previous.header.id));
                    }

                    open = Some(Open {
                        reference: header.reference.start,
                        query: header.query.start,
                        header,
                    });
                }
                Line::Block(block) => {
                    let mut section = open.take().ok_or(Error::BlockOutsideSection)?;
                    let header = &section.header;

                    hm.entry(header.reference.chromosome.clone())
                        .or_default()
                        .push(lapper::Interval {
                            start: section.reference,
                            stop: section.reference + block.size,
                            val: Block {
                                chromosome: header.query.chromosome.clone(),
                                size: header.query.size,
                                strand: header.query.strand,
                                start: section.query,
                                score: header.score,
                                id: header.id,
                            },
                        });

                    section.reference += block.size;
                    section.query += block.size;

                    match block.gaps {
                        Some((dt, dq)) => {
                            section.reference += dt;
                            section.query += dq;
                            open = Some(section);
                        }
                        None => {
                            if section.reference != header.reference.end
                                || section.query != header.query.end
                            {
                                return Err(Error::MisalignedSection(header.id));
                            }
                        }
                    }
                }
            }
        }

        if let Some(section) = open {
            return Err(Error::UnterminatedSection(section.header.id));
        }

        let inner = hm
            .into_iter()
            .map(|(k, v)| (k, lapper::Lapper::new(v)))
            .collect();

        Ok(Machine { inner })
    }
}

/// A machine for lifting over positions from a reference genome to a query
/// genome.
///
/// Generally, you will want to use a [`Builder`] to construct one of these.
#[derive(Debug)]
pub struct Machine {
    /// The aligned blocks of each reference chromosome.
    inner: HashMap<String, lapper::Lapper<Position, Block>>,
}

impl Machine {
    /// Lifts a single 0-based base position.
    ///
    /// Loci are stored in forward-strand coordinates, so `position` is always
    /// a forward-strand position and `strand` only labels the feature. When
    /// the position lands in a block aligned to the negative query strand,
    /// the strand label is flipped and the position is mirrored onto the
    /// forward strand of the query. If more than one chain covers the
    /// position, the highest-scoring chain wins.
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::core::Strand;
    /// use orfdb::liftover::chain::machine::Builder;
    /// use orfdb::liftover::chain::Reader;
    ///
    /// let data = b"chain 0 seq0 10 + 0 10 seq1 10 - 0 10 0\n10";
    /// let machine = Builder.try_build_from(Reader::new(&data[..]))?;
    ///
    /// let lifted = machine.lift("seq0", Strand::Positive, 1).unwrap();
    /// assert_eq!(lifted.chromosome, "seq1");
    /// assert_eq!(lifted.strand, Strand::Negative);
    /// assert_eq!(lifted.position, 8);
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn lift(&self, chromosome: &str, strand: Strand, position: Position) -> Option<Lifted> {
        let iv = self
            .inner
            .get(chromosome)?
            .find(position, position + 1)
            .max_by(|a, b| {
                a.val
                    .score
                    .cmp(&b.val.score)
                    .then_with(|| b.val.id.cmp(&a.val.id))
            })?;

        let block = &iv.val;
        let offset = position - iv.start;

        match block.strand {
            Strand::Positive => Some(Lifted::new(
                block.chromosome.clone(),
                strand,
                block.start + offset,
            )),
            Strand::Negative => Some(Lifted::new(
                block.chromosome.clone(),
                strand.complement(),
                block.size - 1 - (block.start + offset),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(data: &[u8]) -> Result<Machine> {
        Builder.try_build_from(Reader::new(data))
    }

    #[test]
    pub fn test_positive_strand_liftover() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let machine = build(b"chain 0 seq0 10 + 0 10 seq1 10 + 0 10 0\n10")?;

        let lifted = machine.lift("seq0", Strand::Positive, 7).unwrap();
        assert_eq!(lifted, Lifted::new("seq1", Strand::Positive, 7));

        let lifted = machine.lift("seq0", Strand::Negative, 0).unwrap();
        assert_eq!(lifted, Lifted::new("seq1", Strand::Negative, 0));

        assert!(machine.lift("seq0", Strand::Positive, 10).is_none());
        assert!(machine.lift("seq9", Strand::Positive, 1).is_none());

        Ok(())
    }

    #[test]
    pub fn test_gaps_are_unmapped() -> std::result::Result<(), Box<dyn std::error::Error>> {
        // Reference [0, 3) -> query [0, 3), then a two base deletion in the
        // query and a one base insertion.
        let machine = build(b"chain 0 seq0 6 + 0 6 seq1 5 + 0 5 1\n3\t2\t1\n1\n")?;

        assert_eq!(machine.lift("seq0", Strand::Positive, 2).unwrap().position, 2);
        assert!(machine.lift("seq0", Strand::Positive, 3).is_none());
        assert!(machine.lift("seq0", Strand::Positive, 4).is_none());
        assert_eq!(machine.lift("seq0", Strand::Positive, 5).unwrap().position, 4);

        Ok(())
    }

    #[test]
    pub fn test_negative_query_strand_flips() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let machine = build(b"chain 0 seq0 4 + 0 4 seq0 5 - 0 5 1\n3\t0\t1\n1")?;

        // Reference 0 maps to the first base of the reverse strand, which is
        // the last base of the forward strand.
        let lifted = machine.lift("seq0", Strand::Positive, 0).unwrap();
        assert_eq!(lifted, Lifted::new("seq0", Strand::Negative, 4));

        let lifted = machine.lift("seq0", Strand::Negative, 3).unwrap();
        assert_eq!(lifted, Lifted::new("seq0", Strand::Positive, 0));

        Ok(())
    }

    #[test]
    pub fn test_highest_scoring_chain_wins() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let machine = build(
            b"chain 10 seq0 10 + 0 10 low 10 + 0 10 1\n10\n\n\
              chain 99 seq0 10 + 0 10 high 10 + 0 10 2\n10\n",
        )?;

        assert_eq!(machine.lift("seq0", Strand::Positive, 4).unwrap().chromosome, "high");

        Ok(())
    }

    #[test]
    pub fn test_invalid_sections() {
        let err = build(b"chain 0 seq0 10 + 0 10 seq1 10 + 0 10 0\n9").unwrap_err();
        assert!(matches!(err, Error::MisalignedSection(0)));

        let err = build(b"chain 0 seq0 10 + 0 10 seq1 10 + 0 10 0\n5\t0\t0\n").unwrap_err();
        assert!(matches!(err, Error::UnterminatedSection(0)));

        let err = build(b"10\n").unwrap_err();
        assert!(matches!(err, Error::BlockOutsideSection));
    }
}
