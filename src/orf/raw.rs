//! Raw, per-source ORF observations.

use serde::Deserialize;
use serde::Serialize;

use crate::core::Key;
use crate::core::Locus;
use crate::orf::Assembly;
use crate::orf::RawOrfId;
use crate::orf::SourceId;

/// The outcome of lifting a raw ORF onto the current assembly.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Liftover {
    /// The raw ORF has not been lifted yet.
    #[default]
    Pending,

    /// Every boundary of the raw ORF mapped onto the current assembly.
    Mapped {
        /// The locus on the current assembly.
        locus: Locus,

        /// The absolute difference between the raw and lifted genomic lengths.
        length_diff: u64,
    },

    /// At least one boundary of the raw ORF could not be mapped.
    Failed {
        /// Why the liftover failed.
        reason: String,
    },
}

impl Liftover {
    /// Whether or not the liftover succeeded.
    pub fn succeeded(&self) -> bool {
        matches!(self, Liftover::Mapped { .. })
    }

    /// Gets the lifted locus, if the liftover succeeded.
    pub fn locus(&self) -> Option<&Locus> {
        match self {
            Liftover::Mapped { locus, .. } => Some(locus),
            _ => None,
        }
    }

    /// Gets the length difference, if the liftover succeeded.
    pub fn length_diff(&self) -> Option<u64> {
        match self {
            Liftover::Mapped { length_diff, .. } => Some(*length_diff),
            _ => None,
        }
    }
}

/// The identity of a raw ORF: its source plus its raw coordinates.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct RawKey {
    /// The data source.
    pub source: SourceId,

    /// The identity of the raw locus.
    pub locus: Key,
}

impl std::fmt::Display for RawKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.source, self.locus)
    }
}

/// A raw ORF as produced by a parser, before it is stored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewRawOrf {
    /// The data source.
    pub source: SourceId,

    /// The assembly the raw coordinates are expressed in.
    pub assembly: Assembly,

    /// The raw locus.
    pub locus: Locus,

    /// The gene symbol reported by the source, if any.
    pub gene: Option<String>,

    /// The transcript reported by the source, if any.
    pub transcript: Option<String>,
}

impl NewRawOrf {
    /// Creates a new raw ORF with no reported gene or transcript.
    pub fn new(source: SourceId, assembly: Assembly, locus: Locus) -> Self {
        Self {
            source,
            assembly,
            locus,
            gene: None,
            transcript: None,
        }
    }

    /// Sets the reported gene symbol.
    pub fn with_gene(mut self, gene: impl Into<String>) -> Self {
        self.gene = Some(gene.into());
        self
    }

    /// Sets the reported transcript.
    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    /// Gets the identity key of the raw ORF.
    pub fn key(&self) -> RawKey {
        RawKey {
            source: self.source.clone(),
            locus: self.locus.key(),
        }
    }
}

/// A stored raw ORF.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RawOrf {
    /// The store identifier.
    id: RawOrfId,

    /// The data source.
    source: SourceId,

    /// The assembly the raw coordinates are expressed in.
    assembly: Assembly,

    /// The raw locus.
    locus: Locus,

    /// The gene symbol reported by the source.
    gene: Option<String>,

    /// The transcript reported by the source.
    transcript: Option<String>,

    /// The current-assembly mirror of the locus.
    liftover: Liftover,
}

impl RawOrf {
    /// Creates a stored raw ORF from a new one.
    pub fn from_new(id: RawOrfId, orf: NewRawOrf) -> Self {
        Self {
            id,
            source: orf.source,
            assembly: orf.assembly,
            locus: orf.locus,
            gene: orf.gene,
            transcript: orf.transcript,
            liftover: Liftover::Pending,
        }
    }

    /// Gets the store identifier.
    pub fn id(&self) -> RawOrfId {
        self.id
    }

    /// Gets the data source.
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Gets the assembly of the raw coordinates.
    pub fn assembly(&self) -> &Assembly {
        &self.assembly
    }

    /// Gets the raw locus.
    pub fn locus(&self) -> &Locus {
        &self.locus
    }

    /// Gets the reported gene symbol.
    pub fn gene(&self) -> Option<&str> {
        self.gene.as_deref()
    }

    /// Gets the reported transcript.
    pub fn transcript(&self) -> Option<&str> {
        self.transcript.as_deref()
    }

    /// Gets the liftover state.
    pub fn liftover(&self) -> &Liftover {
        &self.liftover
    }

    /// Replaces the liftover state.
    pub fn set_liftover(&mut self, liftover: Liftover) {
        self.liftover = liftover;
    }

    /// Gets the identity key of the raw ORF.
    pub fn key(&self) -> RawKey {
        RawKey {
            source: self.source.clone(),
            locus: self.locus.key(),
        }
    }
}
