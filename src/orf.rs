//! The records that make up the ORF graph.
//!
//! - [`RawOrf`]s are observations reported by one data source in the
//!   coordinates of some genome assembly.
//! - [`CanonicalOrf`]s are the deduplicated, source-independent ORFs on the
//!   current assembly.
//! - [`Association`]s link a canonical ORF to a transcript and record which
//!   raw observations contributed to the link.
//! - [`GeneConflict`]s capture raw observations that resolved to more than one
//!   gene and need manual review.

use serde::Deserialize;
use serde::Serialize;

pub mod association;
pub mod canonical;
pub mod conflict;
pub mod raw;

pub use association::Association;
pub use canonical::CanonicalOrf;
pub use conflict::GeneConflict;
pub use raw::Liftover;
pub use raw::NewRawOrf;
pub use raw::RawOrf;

/// The identifier of a [`RawOrf`] within a store.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct RawOrfId(pub u64);

impl std::fmt::Display for RawOrfId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "raw:{}", self.0)
    }
}

/// The identifier of a [`CanonicalOrf`] within a store.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct OrfId(pub u64);

impl std::fmt::Display for OrfId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "orf:{}", self.0)
    }
}

/// The identifier of a data source (for example, a publication's dataset).
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a new [`SourceId`].
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Gets the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The name of a genome assembly (e.g., `GRCh37`).
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Assembly(String);

impl Assembly {
    /// Creates a new [`Assembly`].
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Gets the assembly name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Assembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identifier of an annotated transcript.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct TranscriptId(String);

impl TranscriptId {
    /// Creates a new [`TranscriptId`].
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Gets the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TranscriptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
