//! Resolving genomic regions to genes and transcripts.
//!
//! An annotation [`Lookup`] returns the transcripts that overlap a region and
//! knows which gene symbols are aliases of which. The [`Resolver`] turns those
//! candidates into a [`Resolution`] for one raw ORF:
//!
//! - no candidate gene: the raw ORF is unresolved and is not merged;
//! - exactly one candidate gene: every candidate transcript is a target;
//! - several candidate genes: every candidate transcript is a target, each
//!   flagged as a conflict, and one [`GeneConflict`] is raised for review.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use rust_lapper as lapper;
use tracing::debug;

use crate::core::Locus;
use crate::core::Position;
use crate::core::Strand;
use crate::orf::GeneConflict;
use crate::orf::RawOrf;
use crate::orf::TranscriptId;
use crate::service::RetryPolicy;
use crate::service::ServiceError;

/// The GTF feature type describing a whole transcript.
const TRANSCRIPT_FEATURE: &str = "transcript";

/// The number of columns in a GTF line.
const NUM_GTF_FIELDS: usize = 9;

/// Matches `key "value"` pairs in the GTF attribute column.
static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)\s+"([^"]*)""#).unwrap());

////////////////////////////////////////////////////////////////////////////////////////
// Candidates and lookups
////////////////////////////////////////////////////////////////////////////////////////

/// A transcript that overlaps a queried region.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Candidate {
    /// The stable gene identifier.
    pub gene_id: String,

    /// The gene symbol.
    pub gene_name: String,

    /// The transcript.
    pub transcript: TranscriptId,
}

/// An annotation lookup service.
pub trait Lookup: Send + Sync {
    /// Gets the transcripts on the same chromosome and strand that overlap
    /// any exon of `locus`.
    fn overlapping(&self, locus: &Locus) -> std::result::Result<Vec<Candidate>, ServiceError>;

    /// Gets the primary symbol for a gene alias, if it is one.
    fn alias(&self, symbol: &str) -> Option<String>;
}

////////////////////////////////////////////////////////////////////////////////////////
// Index
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to building an [`Index`].
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(std::io::Error),

    /// A GTF line with the wrong number of columns.
    IncorrectNumberOfFields(usize, usize),

    /// A GTF line with an unparseable coordinate.
    InvalidPosition(usize, String),

    /// A GTF line with an unparseable strand.
    InvalidStrand(usize, String),

    /// A transcript line without the named attribute.
    MissingAttribute(usize, &'static str),

    /// An alias table line without two columns.
    InvalidAlias(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::IncorrectNumberOfFields(line_no, n) => write!(
                f,
                "line {line_no}: expected {NUM_GTF_FIELDS} fields, found {n} fields"
            ),
            Error::InvalidPosition(line_no, value) => {
                write!(f, "line {line_no}: invalid position: {value}")
            }
            Error::InvalidStrand(line_no, value) => {
                write!(f, "line {line_no}: invalid strand: {value}")
            }
            Error::MissingAttribute(line_no, name) => {
                write!(f, "line {line_no}: missing attribute `{name}`")
            }
            Error::InvalidAlias(line_no) => {
                write!(f, "line {line_no}: expected an alias and a symbol")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

/// Parses one GTF transcript line into its span and candidate.
fn parse_transcript(
    line_no: usize,
    line: &str,
) -> Result<Option<(String, Strand, Position, Position, Candidate)>> {
    let fields = line.split('\t').collect::<Vec<_>>();

    if fields.len() != NUM_GTF_FIELDS {
        return Err(Error::IncorrectNumberOfFields(line_no, fields.len()));
    }

    if fields[2] != TRANSCRIPT_FEATURE {
        return Ok(None);
    }

    let position = |value: &str| {
        value
            .parse::<Position>()
            .map_err(|_| Error::InvalidPosition(line_no, value.to_string()))
    };

    // GTF is 1-based and fully closed.
    let start = position(fields[3])?.saturating_sub(1);
    let end = position(fields[4])?;
    let strand = fields[6]
        .parse::<Strand>()
        .map_err(|_| Error::InvalidStrand(line_no, fields[6].to_string()))?;

    let attributes = ATTRIBUTE
        .captures_iter(fields[8])
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect::<HashMap<_, _>>();

    let attribute = |name: &'static str| {
        attributes
            .get(name)
            .map(|value| value.to_string())
            .ok_or(Error::MissingAttribute(line_no, name))
    };

    let gene_id = attribute("gene_id")?;
    let gene_name = attribute("gene_name").unwrap_or_else(|_| gene_id.clone());
    let transcript = TranscriptId::new(attribute("transcript_id")?);

    Ok(Some((
        fields[0].to_string(),
        strand,
        start,
        end,
        Candidate {
            gene_id,
            gene_name,
            transcript,
        },
    )))
}

/// An in-memory annotation built from a GTF file and an alias table.
#[derive(Debug, Default)]
pub struct Index {
    /// The transcripts on each chromosome and strand.
    transcripts: HashMap<(String, Strand), lapper::Lapper<Position, Candidate>>,

    /// Gene aliases to primary symbols.
    aliases: HashMap<String, String>,
}

impl Index {
    /// Builds an index from GTF data and, optionally, a tab-separated alias
    /// table (`alias<TAB>symbol`, `#` starts a comment).
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::annotation::Index;
    /// use orfdb::annotation::Lookup;
    /// use orfdb::core::Locus;
    /// use orfdb::core::Strand;
    ///
    /// let gtf = "1\tsrc\ttranscript\t101\t500\t.\t+\t.\tgene_id \"G1\"; gene_name \"ABC\"; transcript_id \"T1\";\n";
    /// let aliases = "XYZ\tABC\n";
    ///
    /// let index = Index::from_readers(gtf.as_bytes(), Some(aliases.as_bytes()))?;
    ///
    /// let locus = Locus::try_new("1", Strand::Positive, 150, 300, vec![], vec![])?;
    /// let candidates = index.overlapping(&locus)?;
    /// assert_eq!(candidates.len(), 1);
    /// assert_eq!(candidates[0].gene_name, "ABC");
    /// assert_eq!(index.alias("XYZ").as_deref(), Some("ABC"));
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_readers<G, A>(gtf: G, aliases: Option<A>) -> Result<Self>
    where
        G: BufRead,
        A: BufRead,
    {
        let mut hm = HashMap::<(String, Strand), Vec<lapper::Interval<Position, Candidate>>>::new();

        for (i, line) in gtf.lines().enumerate() {
            let line = line.map_err(Error::Io)?;
            let line = line.trim_end();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((chromosome, strand, start, stop, candidate)) =
                parse_transcript(i + 1, line)?
            {
                hm.entry((chromosome, strand))
                    .or_default()
                    .push(lapper::Interval {
                        start,
                        stop,
                        val: candidate,
                    });
            }
        }

        let transcripts = hm
            .into_iter()
            .map(|(k, v)| (k, lapper::Lapper::new(v)))
            .collect::<HashMap<_, _>>();

        let mut table = HashMap::new();

        if let Some(aliases) = aliases {
            for (i, line) in aliases.lines().enumerate() {
                let line = line.map_err(Error::Io)?;
                let line = line.trim();

                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                match line.split('\t').collect::<Vec<_>>()[..] {
                    [alias, symbol] => {
                        table.insert(alias.trim().to_string(), symbol.trim().to_string());
                    }
                    _ => return Err(Error::InvalidAlias(i + 1)),
                }
            }
        }

        debug!(
            "indexed transcripts on {} chromosome strands and {} aliases",
            transcripts.len(),
            table.len()
        );

        Ok(Self {
            transcripts,
            aliases: table,
        })
    }

    /// Builds an index from a GTF file and an optional alias table on disk.
    /// Either may be gzip-compressed.
    pub fn open(gtf: &Path, aliases: Option<&Path>) -> Result<Self> {
        let gtf = crate::io::open(gtf).map_err(Error::Io)?;
        let aliases = aliases
            .map(crate::io::open)
            .transpose()
            .map_err(Error::Io)?;

        Self::from_readers(gtf, aliases)
    }
}

impl Lookup for Index {
    fn overlapping(&self, locus: &Locus) -> std::result::Result<Vec<Candidate>, ServiceError> {
        let Some(lapper) = self
            .transcripts
            .get(&(locus.chromosome().to_string(), locus.strand()))
        else {
            return Ok(Vec::new());
        };

        let candidates = locus
            .exons()
            .iter()
            .flat_map(|exon| lapper.find(exon.start(), exon.end()))
            .map(|iv| iv.val.clone())
            .collect::<BTreeSet<_>>();

        Ok(candidates.into_iter().collect())
    }

    fn alias(&self, symbol: &str) -> Option<String> {
        self.aliases.get(symbol).cloned()
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Resolution
////////////////////////////////////////////////////////////////////////////////////////

/// A transcript a raw ORF resolved to.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Target {
    /// The transcript.
    pub transcript: TranscriptId,

    /// The gene the transcript belongs to.
    pub gene: String,
}

/// The outcome of resolving one raw ORF.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// No candidate gene was found.
    Unresolved,

    /// Exactly one candidate gene was found.
    Resolved(Vec<Target>),

    /// More than one candidate gene was found.
    Ambiguous(Vec<Target>, GeneConflict),
}

impl Resolution {
    /// Gets the resolved transcripts.
    pub fn targets(&self) -> &[Target] {
        match self {
            Resolution::Unresolved => &[],
            Resolution::Resolved(targets) | Resolution::Ambiguous(targets, _) => targets,
        }
    }

    /// Whether or not the raw ORF resolved to more than one gene.
    pub fn conflicted(&self) -> bool {
        matches!(self, Resolution::Ambiguous(..))
    }

    /// Gets the conflict to record, if any.
    pub fn conflict(&self) -> Option<&GeneConflict> {
        match self {
            Resolution::Ambiguous(_, conflict) => Some(conflict),
            _ => None,
        }
    }
}

/// Strips a version suffix (`ENST0001.4` becomes `ENST0001`).
fn unversioned(transcript: &str) -> &str {
    match transcript.rsplit_once('.') {
        Some((id, version)) if version.chars().all(|c| c.is_ascii_digit()) => id,
        _ => transcript,
    }
}

/// Applies the gene and transcript resolution policy on top of a [`Lookup`].
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    /// The annotation lookup.
    lookup: &'a dyn Lookup,

    /// How to retry the lookup.
    policy: &'a RetryPolicy,
}

impl std::fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("policy", self.policy)
            .finish_non_exhaustive()
    }
}

impl<'a> Resolver<'a> {
    /// Creates a new [`Resolver`].
    pub fn new(lookup: &'a dyn Lookup, policy: &'a RetryPolicy) -> Self {
        Self { lookup, policy }
    }

    /// Resolves a raw ORF whose lifted locus is `locus`.
    ///
    /// If the source reported a gene symbol, only candidates of that gene are
    /// kept, looking the symbol up in the alias table when it matches nothing
    /// directly. If the source reported a transcript that is among the
    /// remaining candidates, only that transcript is kept.
    pub fn resolve(
        &self,
        raw: &RawOrf,
        locus: &Locus,
    ) -> std::result::Result<Resolution, ServiceError> {
        let mut candidates = self
            .policy
            .run("annotation lookup", || self.lookup.overlapping(locus))?;

        if let Some(symbol) = raw.gene() {
            let matches = |symbol: &str, c: &Candidate| c.gene_name == symbol || c.gene_id == symbol;

            if !candidates.iter().any(|c| matches(symbol, c)) {
                match self.lookup.alias(symbol) {
                    Some(primary) => {
                        debug!("{}: gene {symbol} is an alias of {primary}", raw.id());
                        candidates.retain(|c| matches(&primary, c));
                    }
                    None => candidates.clear(),
                }
            } else {
                candidates.retain(|c| matches(symbol, c));
            }
        }

        if let Some(reported) = raw.transcript() {
            let reported = unversioned(reported);

            if candidates
                .iter()
                .any(|c| unversioned(c.transcript.as_str()) == reported)
            {
                candidates.retain(|c| unversioned(c.transcript.as_str()) == reported);
            }
        }

        let mut genes = BTreeMap::<&str, &str>::new();
        for candidate in &candidates {
            genes.insert(&candidate.gene_id, &candidate.gene_name);
        }

        let targets = candidates
            .iter()
            .map(|c| Target {
                transcript: c.transcript.clone(),
                gene: c.gene_id.clone(),
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        Ok(match genes.len() {
            0 => Resolution::Unresolved,
            1 => Resolution::Resolved(targets),
            _ => {
                let conflict = GeneConflict {
                    raw: raw.id(),
                    locus: locus.clone(),
                    genes: genes.keys().map(|g| g.to_string()).collect(),
                    transcripts: targets.iter().map(|t| t.transcript.clone()).collect(),
                };

                Resolution::Ambiguous(targets, conflict)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orf::Assembly;
    use crate::orf::NewRawOrf;
    use crate::orf::RawOrfId;
    use crate::orf::SourceId;

    const GTF: &str = "\
#!genome-build test
1\tsrc\tgene\t101\t1000\t.\t+\t.\tgene_id \"G1\"; gene_name \"ABC\";
1\tsrc\ttranscript\t101\t1000\t.\t+\t.\tgene_id \"G1\"; gene_name \"ABC\"; transcript_id \"T1.2\";
1\tsrc\ttranscript\t201\t800\t.\t+\t.\tgene_id \"G1\"; gene_name \"ABC\"; transcript_id \"T2\";
1\tsrc\ttranscript\t151\t400\t.\t+\t.\tgene_id \"G2\"; gene_name \"DEF\"; transcript_id \"T3\";
1\tsrc\ttranscript\t101\t1000\t.\t-\t.\tgene_id \"G9\"; gene_name \"NEG\"; transcript_id \"T9\";
";

    fn index() -> Index {
        Index::from_readers(GTF.as_bytes(), Some("OLD\tDEF\n".as_bytes())).unwrap()
    }

    fn raw(start: Position, stop: Position) -> RawOrf {
        let locus = Locus::try_new("1", Strand::Positive, start, stop, vec![], vec![]).unwrap();
        RawOrf::from_new(
            RawOrfId(7),
            NewRawOrf::new(SourceId::new("X"), Assembly::new("GRCh38"), locus),
        )
    }

    #[test]
    fn test_index_respects_strand_and_exons() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let index = index();

        let locus = Locus::try_new("1", Strand::Positive, 100, 900, vec![100, 850], vec![120, 900])?;
        let candidates = index.overlapping(&locus)?;
        let transcripts = candidates
            .iter()
            .map(|c| c.transcript.as_str())
            .collect::<Vec<_>>();
        assert_eq!(transcripts, vec!["T1.2"]);

        let locus = Locus::try_new("2", Strand::Positive, 100, 900, vec![], vec![])?;
        assert!(index.overlapping(&locus)?.is_empty());

        Ok(())
    }

    #[test]
    fn test_single_gene_resolves_every_transcript(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let index = index();
        let policy = RetryPolicy::none();
        let raw = raw(500, 700);

        let resolution = Resolver::new(&index, &policy).resolve(&raw, raw.locus())?;
        assert!(!resolution.conflicted());
        assert_eq!(resolution.targets().len(), 2);

        Ok(())
    }

    #[test]
    fn test_many_genes_raise_one_conflict() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let index = index();
        let policy = RetryPolicy::none();
        let raw = raw(250, 300);

        let resolution = Resolver::new(&index, &policy).resolve(&raw, raw.locus())?;
        assert!(resolution.conflicted());
        assert_eq!(resolution.targets().len(), 3);

        let conflict = resolution.conflict().unwrap();
        assert_eq!(conflict.raw, RawOrfId(7));
        assert_eq!(conflict.genes.len(), 2);

        Ok(())
    }

    #[test]
    fn test_reported_gene_and_alias_narrow_the_candidates(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let index = index();
        let policy = RetryPolicy::none();
        let resolver = Resolver::new(&index, &policy);

        let mut orf = raw(250, 300);
        let direct = RawOrf::from_new(
            orf.id(),
            NewRawOrf::new(orf.source().clone(), orf.assembly().clone(), orf.locus().clone())
                .with_gene("ABC")
                .with_transcript("T1.1"),
        );
        let resolution = resolver.resolve(&direct, direct.locus())?;
        assert!(!resolution.conflicted());
        assert_eq!(
            resolution.targets(),
            &[Target {
                transcript: TranscriptId::new("T1.2"),
                gene: String::from("G1")
            }]
        );

        orf = RawOrf::from_new(
            orf.id(),
            NewRawOrf::new(orf.source().clone(), orf.assembly().clone(), orf.locus().clone())
                .with_gene("OLD"),
        );
        let resolution = resolver.resolve(&orf, orf.locus())?;
        assert_eq!(resolution.targets().len(), 1);
        assert_eq!(resolution.targets()[0].gene, "G2");

        let unknown = RawOrf::from_new(
            orf.id(),
            NewRawOrf::new(orf.source().clone(), orf.assembly().clone(), orf.locus().clone())
                .with_gene("NOPE"),
        );
        assert_eq!(
            resolver.resolve(&unknown, unknown.locus())?,
            Resolution::Unresolved
        );

        Ok(())
    }

    #[test]
    fn test_malformed_gtf() {
        let err = Index::from_readers("1\tsrc\ttranscript\n".as_bytes(), None::<&[u8]>).unwrap_err();
        assert!(matches!(err, Error::IncorrectNumberOfFields(1, 3)));

        let line = "1\tsrc\ttranscript\t1\t10\t.\t+\t.\tgene_id \"G1\";\n";
        let err = Index::from_readers(line.as_bytes(), None::<&[u8]>).unwrap_err();
        assert_eq!(err.to_string(), "line 1: missing attribute `transcript_id`");
    }
}
