//! Parsers that turn source files into raw ORFs.
//!
//! Each data source is read by a [`Parser`]. Parsers are looked up by kind in
//! a [`Registry`] when the configuration is loaded, so an unknown kind is
//! reported before anything is read.

use std::collections::BTreeMap;
use std::io::Read;

use serde::Deserialize;
use tracing::debug;

use crate::core::locus;
use crate::core::strand::ParseStrandError;
use crate::core::Locus;
use crate::core::Position;
use crate::core::Strand;
use crate::orf::Assembly;
use crate::orf::NewRawOrf;
use crate::orf::SourceId;

/// The kind of the tab-separated parser.
pub const TSV: &str = "tsv";

/// The kind of the comma-separated parser.
pub const CSV: &str = "csv";

/// An error related to parsing a source.
#[derive(Debug)]
pub enum Error {
    /// The file could not be read or split into records.
    Csv(csv::Error),

    /// A record has an invalid strand.
    InvalidStrand(u64, ParseStrandError),

    /// A splice list is not a comma-separated list of positions.
    InvalidSpliceList(u64, String),

    /// A record does not describe a valid locus.
    InvalidLocus(u64, locus::Error),

    /// No parser is registered for a kind.
    UnknownKind(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Csv(err) => write!(f, "{err}"),
            Error::InvalidStrand(line, err) => write!(f, "line {line}: {err}"),
            Error::InvalidSpliceList(line, value) => {
                write!(f, "line {line}: invalid splice list: {value}")
            }
            Error::InvalidLocus(line, err) => write!(f, "line {line}: {err}"),
            Error::UnknownKind(kind) => write!(f, "unknown source kind: {kind}"),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

/// Turns the contents of a source file into raw ORFs.
pub trait Parser: Send + Sync + std::fmt::Debug {
    /// Parses every raw ORF in `reader`, attributing them to `source` and
    /// `assembly`.
    fn parse(
        &self,
        reader: &mut dyn Read,
        source: &SourceId,
        assembly: &Assembly,
    ) -> Result<Vec<NewRawOrf>>;
}

////////////////////////////////////////////////////////////////////////////////////////
// Delimited text
////////////////////////////////////////////////////////////////////////////////////////

/// One row of a delimited source file.
#[derive(Debug, Deserialize)]
struct Row {
    /// The chromosome.
    chromosome: String,
    /// The strand (`+` or `-`).
    strand: String,
    /// The 0-based start.
    start: Position,
    /// The exclusive stop.
    stop: Position,
    /// Comma-separated exon starts.
    #[serde(default)]
    splice_starts: Option<String>,
    /// Comma-separated exon ends.
    #[serde(default)]
    splice_ends: Option<String>,
    /// The reported gene symbol.
    #[serde(default)]
    gene: Option<String>,
    /// The reported transcript.
    #[serde(default)]
    transcript: Option<String>,
}

/// Parses a comma-separated list of positions. An absent or blank list is
/// empty.
fn positions(line: u64, value: Option<&str>) -> Result<Vec<Position>> {
    let value = value.unwrap_or_default().trim();

    if value.is_empty() {
        return Ok(Vec::new());
    }

    value
        .split(',')
        .map(|v| v.trim().parse::<Position>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| Error::InvalidSpliceList(line, value.to_string()))
}

/// A parser for delimited text with a header row naming the columns
/// `chromosome`, `strand`, `start`, `stop`, and optionally `splice_starts`,
/// `splice_ends`, `gene`, and `transcript`.
///
/// Positions are 0-based and half-open. Lines starting with `#` are ignored.
///
/// # Examples
///
/// ```
/// use orfdb::orf::Assembly;
/// use orfdb::orf::SourceId;
/// use orfdb::source::Parser;
/// use orfdb::source::Tabular;
///
/// let data = "chromosome\tstrand\tstart\tstop\tsplice_starts\tsplice_ends\tgene\ttranscript\n\
///             1\t+\t100\t400\t\t\tABC\t\n";
///
/// let orfs = Tabular::tsv().parse(
///     &mut data.as_bytes(),
///     &SourceId::new("X"),
///     &Assembly::new("GRCh37"),
/// )?;
///
/// assert_eq!(orfs.len(), 1);
/// assert_eq!(orfs[0].locus.genomic_length(), 300);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Tabular {
    /// The field delimiter.
    delimiter: u8,
}

impl Tabular {
    /// Creates a parser for tab-separated files.
    pub fn tsv() -> Self {
        Self { delimiter: b'\t' }
    }

    /// Creates a parser for comma-separated files. Splice lists must be
    /// quoted.
    pub fn csv() -> Self {
        Self { delimiter: b',' }
    }
}

impl Parser for Tabular {
    fn parse(
        &self,
        reader: &mut dyn Read,
        source: &SourceId,
        assembly: &Assembly,
    ) -> Result<Vec<NewRawOrf>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers().map_err(Error::Csv)?.clone();
        let mut orfs = Vec::new();

        for result in reader.records() {
            let record = result.map_err(Error::Csv)?;
            let line = record.position().map_or(0, |p| p.line());
            let row: Row = record.deserialize(Some(&headers)).map_err(Error::Csv)?;

            let strand = row
                .strand
                .parse::<Strand>()
                .map_err(|err| Error::InvalidStrand(line, err))?;

            let locus = Locus::try_new(
                row.chromosome,
                strand,
                row.start,
                row.stop,
                positions(line, row.splice_starts.as_deref())?,
                positions(line, row.splice_ends.as_deref())?,
            )
            .map_err(|err| Error::InvalidLocus(line, err))?;

            let mut orf = NewRawOrf::new(source.clone(), assembly.clone(), locus);

            if let Some(gene) = row.gene.filter(|g| !g.is_empty()) {
                orf = orf.with_gene(gene);
            }

            if let Some(transcript) = row.transcript.filter(|t| !t.is_empty()) {
                orf = orf.with_transcript(transcript);
            }

            orfs.push(orf);
        }

        debug!("parsed {} raw ORFs for {source}", orfs.len());

        Ok(orfs)
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Registry
////////////////////////////////////////////////////////////////////////////////////////

/// The parsers available by kind.
#[derive(Debug)]
pub struct Registry {
    /// The parsers.
    parsers: BTreeMap<String, Box<dyn Parser>>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self {
            parsers: BTreeMap::new(),
        };

        registry.register(TSV, Tabular::tsv());
        registry.register(CSV, Tabular::csv());

        registry
    }
}

impl Registry {
    /// Registers a parser under `kind`, replacing any parser registered under
    /// the same kind.
    pub fn register(&mut self, kind: impl Into<String>, parser: impl Parser + 'static) {
        self.parsers.insert(kind.into(), Box::new(parser));
    }

    /// Gets the parser registered under `kind`.
    pub fn get(&self, kind: &str) -> Result<&dyn Parser> {
        self.parsers
            .get(kind)
            .map(|parser| parser.as_ref())
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }

    /// Gets the registered kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.parsers.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "chromosome\tstrand\tstart\tstop\tsplice_starts\tsplice_ends\tgene\ttranscript\n";

    fn parse(data: &str) -> Result<Vec<NewRawOrf>> {
        Registry::default().get(TSV)?.parse(
            &mut data.as_bytes(),
            &SourceId::new("X"),
            &Assembly::new("GRCh37"),
        )
    }

    #[test]
    fn test_spliced_rows() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let data = format!(
            "{HEADER}# a comment\n\
             1\t-\t100\t400\t300,100\t400,200\tABC\tENST01.2\n\
             2\t+\t5\t20\t\t\t\t\n"
        );

        let orfs = parse(&data)?;
        assert_eq!(orfs.len(), 2);

        let first = &orfs[0];
        assert_eq!(first.locus.strand(), Strand::Negative);
        assert_eq!(first.locus.splice_starts(), &[100, 300]);
        assert_eq!(first.locus.splice_ends(), &[200, 400]);
        assert_eq!(first.locus.genomic_length(), 200);
        assert_eq!(first.gene.as_deref(), Some("ABC"));
        assert_eq!(first.transcript.as_deref(), Some("ENST01.2"));

        let second = &orfs[1];
        assert!(!second.locus.spliced());
        assert_eq!(second.gene, None);
        assert_eq!(second.transcript, None);

        Ok(())
    }

    #[test]
    fn test_invalid_rows() {
        let err = parse(&format!("{HEADER}1\t?\t100\t400\t\t\t\t\n")).unwrap_err();
        assert!(matches!(err, Error::InvalidStrand(2, _)));

        let err = parse(&format!("{HEADER}1\t+\t100\t400\t1x0\t200\t\t\n")).unwrap_err();
        assert!(matches!(err, Error::InvalidSpliceList(2, _)));

        let err = parse(&format!("{HEADER}1\t+\t400\t100\t\t\t\t\n")).unwrap_err();
        assert!(matches!(err, Error::InvalidLocus(2, _)));
    }

    #[test]
    fn test_unknown_kinds() {
        let registry = Registry::default();
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec![CSV, TSV]);
        assert!(matches!(
            registry.get("bed"),
            Err(Error::UnknownKind(kind)) if kind == "bed"
        ));
    }
}
