//! Nucleotide sequence retrieval and translation.

use std::collections::HashMap;
use std::path::Path;

use noodles::core::region::Interval;
use noodles::fasta;
use tracing::info;

use crate::core::Locus;
use crate::core::Strand;
use crate::service::ServiceError;

/// The standard genetic code (NCBI table 1) with codons ordered `TCAG` at
/// each position.
const STANDARD_CODE: &[u8; 64] =
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

/// A source of nucleotide sequences.
pub trait Source: Send + Sync {
    /// Gets the spliced nucleotide sequence of `locus`, reverse complemented
    /// when the locus is on the negative strand.
    fn fetch(&self, locus: &Locus) -> Result<Vec<u8>, ServiceError>;
}

/// Gets the reverse complement of a nucleotide sequence. Bases other than
/// `ACGT` are kept as they are.
///
/// # Examples
///
/// ```
/// use orfdb::sequence::reverse_complement;
///
/// assert_eq!(reverse_complement(b"ATGCn"), b"nGCAT");
/// ```
pub fn reverse_complement(sequence: &[u8]) -> Vec<u8> {
    sequence
        .iter()
        .rev()
        .map(|b| match b {
            b'A' => b'T',
            b'T' => b'A',
            b'G' => b'C',
            b'C' => b'G',
            b'a' => b't',
            b't' => b'a',
            b'g' => b'c',
            b'c' => b'g',
            _ => *b,
        })
        .collect()
}

/// Gets the index of a base within `TCAG`.
fn base_index(base: u8) -> Option<usize> {
    match base.to_ascii_uppercase() {
        b'T' | b'U' => Some(0),
        b'C' => Some(1),
        b'A' => Some(2),
        b'G' => Some(3),
        _ => None,
    }
}

/// Translates a nucleotide sequence with the standard genetic code.
///
/// Stop codons become `*` (translation continues past them), codons with
/// ambiguous bases become `X`, and a trailing partial codon is ignored.
///
/// # Examples
///
/// ```
/// use orfdb::sequence::translate;
///
/// assert_eq!(translate(b"ATGAAANNNTAAGC"), "MKX*");
/// ```
pub fn translate(sequence: &[u8]) -> String {
    sequence
        .chunks_exact(3)
        .map(|codon| {
            match (
                base_index(codon[0]),
                base_index(codon[1]),
                base_index(codon[2]),
            ) {
                (Some(a), Some(b), Some(c)) => char::from(STANDARD_CODE[a * 16 + b * 4 + c]),
                _ => 'X',
            }
        })
        .collect()
}

/// An error related to loading a [`Fasta`] reference.
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A reference genome held in memory, loaded from a FASTA file.
#[derive(Debug, Default)]
pub struct Fasta {
    /// The sequence of each chromosome.
    sequences: HashMap<String, fasta::record::Sequence>,
}

impl Fasta {
    /// Reads every record of the FASTA file at `path`.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let mut sequences = HashMap::new();

        for result in fasta::reader::Builder
            .build_from_path(path)
            .map_err(Error::Io)?
            .records()
        {
            let record = result.map_err(Error::Io)?;
            let name = String::from_utf8_lossy(record.name()).to_string();
            sequences.insert(name, record.sequence().clone());
        }

        info!(
            "loaded {} reference sequences from {}",
            sequences.len(),
            path.display()
        );

        Ok(Self { sequences })
    }

    /// Creates a reference from in-memory sequences.
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::core::Locus;
    /// use orfdb::core::Strand;
    /// use orfdb::sequence::Fasta;
    /// use orfdb::sequence::Source;
    ///
    /// let fasta = Fasta::from_sequences([("1", b"CCATGAAATAGCC".to_vec())]);
    ///
    /// let locus = Locus::try_new("1", Strand::Positive, 2, 11, vec![], vec![])?;
    /// assert_eq!(fasta.fetch(&locus)?, b"ATGAAATAG");
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_sequences<I, N>(sequences: I) -> Self
    where
        I: IntoIterator<Item = (N, Vec<u8>)>,
        N: Into<String>,
    {
        Self {
            sequences: sequences
                .into_iter()
                .map(|(name, sequence)| (name.into(), fasta::record::Sequence::from(sequence)))
                .collect(),
        }
    }
}

impl Source for Fasta {
    fn fetch(&self, locus: &Locus) -> Result<Vec<u8>, ServiceError> {
        let sequence = self.sequences.get(locus.chromosome()).ok_or_else(|| {
            ServiceError::Rejected(format!(
                "chromosome {} is not in the reference",
                locus.chromosome()
            ))
        })?;

        let mut result = Vec::with_capacity(locus.genomic_length() as usize);

        for exon in locus.exons() {
            let out_of_bounds = || {
                ServiceError::Rejected(format!(
                    "{}:{exon} is outside of the reference",
                    locus.chromosome()
                ))
            };

            // noodles positions are 1-based and fully closed.
            let start = noodles::core::Position::new(exon.start() as usize + 1)
                .ok_or_else(out_of_bounds)?;
            let end = noodles::core::Position::new(exon.end() as usize).ok_or_else(out_of_bounds)?;

            let slice = sequence
                .slice(Interval::from(start..=end))
                .ok_or_else(out_of_bounds)?;

            result.extend(slice.as_ref().iter().map(u8::to_ascii_uppercase));
        }

        Ok(match locus.strand() {
            Strand::Positive => result,
            Strand::Negative => reverse_complement(&result),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_every_codon() {
        let mut codons = Vec::new();
        for a in b"TCAG" {
            for b in b"TCAG" {
                for c in b"TCAG" {
                    codons.extend([*a, *b, *c]);
                }
            }
        }

        assert_eq!(translate(&codons).as_bytes(), STANDARD_CODE);
        assert_eq!(translate(b"atgtgguga"), "MW*");
        assert_eq!(translate(b"AT"), "");
    }

    #[test]
    fn test_spliced_negative_strand_fetch() -> Result<(), Box<dyn std::error::Error>> {
        //                                     0123456789
        let fasta = Fasta::from_sequences([("1", b"AAcatTTTgg".to_vec())]);

        let locus = Locus::try_new("1", Strand::Positive, 2, 10, vec![2, 8], vec![5, 10])?;
        assert_eq!(fasta.fetch(&locus)?, b"CATGG");

        let locus = Locus::try_new("1", Strand::Negative, 2, 10, vec![2, 8], vec![5, 10])?;
        assert_eq!(fasta.fetch(&locus)?, b"CCATG");

        let locus = Locus::try_new("1", Strand::Positive, 8, 11, vec![], vec![])?;
        assert!(fasta.fetch(&locus).is_err());

        let locus = Locus::try_new("2", Strand::Positive, 0, 3, vec![], vec![])?;
        assert!(matches!(
            fasta.fetch(&locus),
            Err(ServiceError::Rejected(_))
        ));

        Ok(())
    }
}
