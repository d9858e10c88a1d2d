//! Configuration profiles.
//!
//! A profile is a TOML file such as the following:
//!
//! ```toml
//! store = "orfs.json.gz"
//!
//! [assemblies]
//! current = "GRCh38"
//!
//! [liftover.chains]
//! GRCh37 = "hg19ToHg38.over.chain.gz"
//!
//! [annotation]
//! gtf = "gencode.v44.annotation.gtf.gz"
//! aliases = "aliases.tsv"
//!
//! [sequence]
//! fasta = "GRCh38.fa"
//!
//! [merge]
//! batch_size = 500
//! workers = 0
//!
//! [retry]
//! max_attempts = 4
//!
//! [filter]
//! min_count_ds = 2
//!
//! [[sources]]
//! id = "ribo-seq-2019"
//! kind = "tsv"
//! path = "sources/ribo-seq-2019.tsv"
//! assembly = "GRCh37"
//! ```
//!
//! Relative paths are resolved against the directory of the profile.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::driver::DEFAULT_BATCH_SIZE;
use crate::filter::Rules;
use crate::orf::Assembly;
use crate::orf::SourceId;
use crate::service::RetryPolicy;
use crate::source::Registry;

/// An error related to a configuration profile.
#[derive(Debug)]
pub enum Error {
    /// The profile could not be read.
    Io(PathBuf, std::io::Error),

    /// The profile is not valid TOML or misses a required setting.
    Toml(toml::de::Error),

    /// The batch size is zero.
    ZeroBatchSize,

    /// Two sources share an identifier.
    DuplicateSource(SourceId),

    /// A source names a parser kind that does not exist.
    UnknownKind(SourceId, String),

    /// A source is on an assembly with no chain file to the current one.
    MissingChain(SourceId, Assembly),

    /// A configured file does not exist.
    MissingFile(&'static str, PathBuf),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(path, err) => write!(f, "could not read {}: {err}", path.display()),
            Error::Toml(err) => write!(f, "invalid profile: {err}"),
            Error::ZeroBatchSize => write!(f, "merge.batch_size must be at least one"),
            Error::DuplicateSource(id) => write!(f, "duplicate source: {id}"),
            Error::UnknownKind(id, kind) => write!(f, "source {id}: unknown kind: {kind}"),
            Error::MissingChain(id, assembly) => write!(
                f,
                "source {id}: no chain file lifts {assembly} onto the current assembly"
            ),
            Error::MissingFile(what, path) => {
                write!(f, "{what} does not exist: {}", path.display())
            }
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

/// The assemblies.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Assemblies {
    /// The assembly every raw ORF is lifted onto.
    pub current: Assembly,
}

/// The liftover settings.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Liftover {
    /// A chain file onto the current assembly, by source assembly.
    #[serde(default)]
    pub chains: BTreeMap<Assembly, PathBuf>,
}

/// The annotation settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Annotation {
    /// The GTF file with the transcripts of the current assembly.
    pub gtf: PathBuf,

    /// The alias table (`alias<TAB>symbol`).
    #[serde(default)]
    pub aliases: Option<PathBuf>,
}

/// The sequence settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Sequence {
    /// The FASTA file of the current assembly.
    pub fasta: PathBuf,
}

/// The merge settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Merge {
    /// The number of raw ORFs per batch.
    pub batch_size: usize,

    /// The number of worker threads (zero for one per core).
    pub workers: usize,
}

impl Default for Merge {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: 0,
        }
    }
}

/// A data source.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Source {
    /// The identifier.
    pub id: SourceId,

    /// The parser kind.
    pub kind: String,

    /// The file to read.
    pub path: PathBuf,

    /// The assembly the file's coordinates are on.
    pub assembly: Assembly,
}

/// A configuration profile.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// The store snapshot.
    pub store: PathBuf,

    /// The assemblies.
    pub assemblies: Assemblies,

    /// The liftover settings.
    #[serde(default)]
    pub liftover: Liftover,

    /// The annotation settings.
    pub annotation: Annotation,

    /// The sequence settings.
    pub sequence: Sequence,

    /// The merge settings.
    #[serde(default)]
    pub merge: Merge,

    /// The retry policy for external services and storage.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// The filter rules.
    #[serde(default)]
    pub filter: Rules,

    /// The data sources.
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Config {
    /// Reads, resolves, and validates the profile at `path`.
    pub fn load(path: &Path, registry: &Registry) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| Error::Io(path.to_path_buf(), err))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));

        let config = Self::parse(&contents, base)?;
        config.validate(registry)?;

        Ok(config)
    }

    /// Parses a profile, resolving relative paths against `base`. The profile
    /// is not validated.
    pub fn parse(contents: &str, base: &Path) -> Result<Self> {
        let mut config: Config = toml::from_str(contents).map_err(Error::Toml)?;

        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        resolve(&mut config.store);
        config.liftover.chains.values_mut().for_each(resolve);
        resolve(&mut config.annotation.gtf);
        config.annotation.aliases.iter_mut().for_each(resolve);
        resolve(&mut config.sequence.fasta);
        config.sources.iter_mut().for_each(|s| resolve(&mut s.path));

        Ok(config)
    }

    /// Checks the settings against each other, the parsers in `registry`,
    /// and the file system.
    pub fn validate(&self, registry: &Registry) -> Result<()> {
        if self.merge.batch_size == 0 {
            return Err(Error::ZeroBatchSize);
        }

        let exists = |what: &'static str, path: &Path| match path.exists() {
            true => Ok(()),
            false => Err(Error::MissingFile(what, path.to_path_buf())),
        };

        for path in self.liftover.chains.values() {
            exists("chain file", path)?;
        }

        exists("annotation", &self.annotation.gtf)?;

        if let Some(aliases) = &self.annotation.aliases {
            exists("alias table", aliases)?;
        }

        exists("reference", &self.sequence.fasta)?;

        let mut seen = HashSet::new();

        for source in &self.sources {
            if !seen.insert(&source.id) {
                return Err(Error::DuplicateSource(source.id.clone()));
            }

            if registry.get(&source.kind).is_err() {
                return Err(Error::UnknownKind(source.id.clone(), source.kind.clone()));
            }

            if source.assembly != self.assemblies.current
                && !self.liftover.chains.contains_key(&source.assembly)
            {
                return Err(Error::MissingChain(
                    source.id.clone(),
                    source.assembly.clone(),
                ));
            }

            exists("source", &source.path)?;
        }

        Ok(())
    }

    /// Gets a source by identifier.
    pub fn source(&self, id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id.as_str() == id)
    }
}
