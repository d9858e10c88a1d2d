//! Unresolved gene assignments kept for manual review.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::Locus;
use crate::orf::RawOrfId;
use crate::orf::TranscriptId;

/// A raw ORF whose region overlapped more than one gene.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GeneConflict {
    /// The raw ORF.
    pub raw: RawOrfId,

    /// The lifted locus of the raw ORF.
    pub locus: Locus,

    /// The candidate genes.
    pub genes: BTreeSet<String>,

    /// The candidate transcripts.
    pub transcripts: BTreeSet<TranscriptId>,
}

impl std::fmt::Display for GeneConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let genes = self.genes.iter().cloned().collect::<Vec<_>>();
        write!(
            f,
            "{} at {} overlaps {} genes: {}",
            self.raw,
            self.locus,
            genes.len(),
            genes.join(", ")
        )
    }
}
