//! Selecting canonical ORFs into the derived namespace.

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::orf::CanonicalOrf;
use crate::store;
use crate::store::Store;

/// The number of canonical ORFs read per page.
const PAGE_SIZE: usize = 10_000;

/// The rules a canonical ORF must pass to be selected.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Rules {
    /// The minimum number of contributing raw ORFs.
    pub min_count_ds: u64,

    /// Whether to drop ORFs whose every contribution was ambiguous.
    pub exclude_fully_ambiguous: bool,

    /// Whether to drop ORFs whose genomic length is not a multiple of three.
    pub require_codon_multiple: bool,

    /// The minimum genomic length, in bases.
    pub min_length: Option<u64>,

    /// The maximum genomic length, in bases.
    pub max_length: Option<u64>,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            min_count_ds: 1,
            exclude_fully_ambiguous: false,
            require_codon_multiple: false,
            min_length: None,
            max_length: None,
        }
    }
}

impl Rules {
    /// Whether or not `orf` passes every rule.
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::core::Locus;
    /// use orfdb::core::Strand;
    /// use orfdb::filter::Rules;
    /// use orfdb::orf::CanonicalOrf;
    /// use orfdb::orf::OrfId;
    ///
    /// let locus = Locus::try_new("1", Strand::Positive, 100, 400, vec![], vec![])?;
    /// let mut orf = CanonicalOrf::new(OrfId(1), locus, String::new(), String::new());
    ///
    /// let rules = Rules {
    ///     min_count_ds: 2,
    ///     ..Default::default()
    /// };
    ///
    /// orf.add_contribution(false);
    /// assert!(!rules.accepts(&orf));
    ///
    /// orf.add_contribution(false);
    /// assert!(rules.accepts(&orf));
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn accepts(&self, orf: &CanonicalOrf) -> bool {
        let length = orf.genomic_length();

        orf.count_ds() >= self.min_count_ds
            && !(self.exclude_fully_ambiguous && orf.count_ds_ambiguous() >= orf.count_ds())
            && !(self.require_codon_multiple && length % 3 != 0)
            && self.min_length.map_or(true, |min| length >= min)
            && self.max_length.map_or(true, |max| length <= max)
    }
}

/// What a filter pass selected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Selection {
    /// The canonical ORFs looked at.
    pub total: usize,

    /// The canonical ORFs selected.
    pub selected: usize,
}

/// Replaces the derived namespace with every canonical ORF that passes
/// `rules`.
pub fn apply<S>(store: &mut S, rules: &Rules) -> store::Result<Selection>
where
    S: Store + ?Sized,
{
    let mut selection = Selection::default();
    let mut selected = Vec::new();
    let mut after = None;

    loop {
        let page = store.orf_page(after, PAGE_SIZE)?;

        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id());

        selection.total += page.len();
        selected.extend(page.iter().filter(|orf| rules.accepts(orf)).map(|orf| orf.id()));
    }

    selection.selected = selected.len();
    store.replace_filtered(selected)?;

    info!(
        "selected {} of {} canonical ORFs",
        selection.selected, selection.total
    );

    Ok(selection)
}
