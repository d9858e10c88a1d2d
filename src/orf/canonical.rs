//! Deduplicated ORFs on the current assembly.

use serde::Deserialize;
use serde::Serialize;

use crate::core::Key;
use crate::core::Locus;
use crate::orf::OrfId;

/// A canonical ORF.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CanonicalOrf {
    /// The store identifier.
    id: OrfId,

    /// The locus on the current assembly.
    locus: Locus,

    /// The nucleotide sequence (spliced, in transcription orientation).
    sequence: String,

    /// The translated amino-acid sequence.
    protein: String,

    /// The number of raw observations contributing to this ORF.
    count_ds: u64,

    /// The number of contributing raw observations with a gene conflict.
    count_ds_ambiguous: u64,
}

impl CanonicalOrf {
    /// Creates a new canonical ORF with no contributions.
    pub fn new(id: OrfId, locus: Locus, sequence: String, protein: String) -> Self {
        Self {
            id,
            locus,
            sequence,
            protein,
            count_ds: 0,
            count_ds_ambiguous: 0,
        }
    }

    /// Gets the store identifier.
    pub fn id(&self) -> OrfId {
        self.id
    }

    /// Gets the locus.
    pub fn locus(&self) -> &Locus {
        &self.locus
    }

    /// Gets the identity key.
    pub fn key(&self) -> Key {
        self.locus.key()
    }

    /// Gets the nucleotide sequence.
    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// Gets the amino-acid sequence.
    pub fn protein(&self) -> &str {
        &self.protein
    }

    /// Gets the genomic length.
    pub fn genomic_length(&self) -> u64 {
        self.locus.genomic_length()
    }

    /// Gets the number of contributing raw observations.
    pub fn count_ds(&self) -> u64 {
        self.count_ds
    }

    /// Gets the number of contributing raw observations with a gene conflict.
    pub fn count_ds_ambiguous(&self) -> u64 {
        self.count_ds_ambiguous
    }

    /// Records one more contributing raw observation.
    pub fn add_contribution(&mut self, ambiguous: bool) {
        self.count_ds += 1;

        if ambiguous {
            self.count_ds_ambiguous += 1;
        }
    }

    /// Removes one contributing raw observation.
    pub fn remove_contribution(&mut self, ambiguous: bool) {
        self.count_ds = self.count_ds.saturating_sub(1);

        if ambiguous {
            self.count_ds_ambiguous = self.count_ds_ambiguous.saturating_sub(1);
        }
    }
}
