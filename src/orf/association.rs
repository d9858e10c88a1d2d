//! Links between canonical ORFs and transcripts.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::orf::OrfId;
use crate::orf::RawOrfId;
use crate::orf::TranscriptId;

/// An association between a [`CanonicalOrf`](crate::orf::CanonicalOrf) and a
/// transcript.
///
/// There is at most one association per (ORF, transcript) pair. Raw ORFs that
/// merge into the same pair are appended to the provenance.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Association {
    /// The canonical ORF.
    orf: OrfId,

    /// The transcript.
    transcript: TranscriptId,

    /// The gene the transcript belongs to.
    gene: String,

    /// The raw ORFs that contributed to this association.
    provenance: BTreeSet<RawOrfId>,

    /// Whether any contributing raw ORF resolved to more than one gene.
    conflict: bool,

    /// The start of the ORF relative to the transcript, once reconciled.
    relative_start: Option<u64>,

    /// The stop of the ORF relative to the transcript, once reconciled.
    relative_stop: Option<u64>,

    /// A quality score, once computed.
    score: Option<f64>,
}

impl Association {
    /// Creates a new association with empty provenance.
    pub fn new(orf: OrfId, transcript: TranscriptId, gene: impl Into<String>) -> Self {
        Self {
            orf,
            transcript,
            gene: gene.into(),
            provenance: BTreeSet::new(),
            conflict: false,
            relative_start: None,
            relative_stop: None,
            score: None,
        }
    }

    /// Gets the canonical ORF.
    pub fn orf(&self) -> OrfId {
        self.orf
    }

    /// Gets the transcript.
    pub fn transcript(&self) -> &TranscriptId {
        &self.transcript
    }

    /// Gets the gene the transcript belongs to.
    pub fn gene(&self) -> &str {
        &self.gene
    }

    /// Gets the contributing raw ORFs.
    pub fn provenance(&self) -> &BTreeSet<RawOrfId> {
        &self.provenance
    }

    /// Whether any contributing raw ORF was ambiguous.
    pub fn conflict(&self) -> bool {
        self.conflict
    }

    /// Gets the reconciled coordinates relative to the transcript.
    pub fn relative_coordinates(&self) -> Option<(u64, u64)> {
        self.relative_start.zip(self.relative_stop)
    }

    /// Gets the quality score.
    pub fn score(&self) -> Option<f64> {
        self.score
    }

    /// Appends a contributing raw ORF. Returns `false` if it was already
    /// present.
    pub fn add_provenance(&mut self, raw: RawOrfId, conflict: bool) -> bool {
        self.conflict |= conflict;
        self.provenance.insert(raw)
    }

    /// Removes a contributing raw ORF. Returns `false` if it was not present.
    ///
    /// The conflict flag is recomputed from the remaining provenance, where
    /// `ambiguous` tells whether a raw ORF resolved to more than one gene.
    pub fn remove_provenance<F>(&mut self, raw: RawOrfId, ambiguous: F) -> bool
    where
        F: Fn(RawOrfId) -> bool,
    {
        let removed = self.provenance.remove(&raw);
        self.conflict = self.provenance.iter().any(|id| ambiguous(*id));
        removed
    }

    /// Copies the reconciled coordinates and the score of `other`.
    /// Provenance and the conflict flag are left untouched.
    pub fn annotate_from(&mut self, other: &Association) {
        self.relative_start = other.relative_start;
        self.relative_stop = other.relative_stop;
        self.score = other.score;
    }

    /// Sets the reconciled coordinates relative to the transcript.
    pub fn set_relative_coordinates(&mut self, start: u64, stop: u64) {
        self.relative_start = Some(start);
        self.relative_stop = Some(stop);
    }

    /// Sets the quality score.
    pub fn set_score(&mut self, score: f64) {
        self.score = Some(score);
    }
}
