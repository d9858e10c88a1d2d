//! An in-memory [`Store`], optionally backed by a snapshot on disk.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::info;

use crate::core::Key;
use crate::driver::Checkpoint;
use crate::orf::raw::RawKey;
use crate::orf::Association;
use crate::orf::CanonicalOrf;
use crate::orf::GeneConflict;
use crate::orf::Liftover;
use crate::orf::NewRawOrf;
use crate::orf::OrfId;
use crate::orf::RawOrf;
use crate::orf::RawOrfId;
use crate::orf::SourceId;
use crate::orf::TranscriptId;
use crate::store::snapshot;
use crate::store::Changeset;
use crate::store::Committed;
use crate::store::Error;
use crate::store::Result;
use crate::store::Store;

/// An in-memory store.
///
/// A store created with [`Memory::open()`] writes a snapshot of itself after
/// every successful commit and on [`Store::flush()`]. If writing the snapshot
/// fails, the store rolls back to the last snapshot on disk.
///
/// Each snapshot is the whole store, so a merge run writes the store once per
/// batch and its cost grows with the size of the store times the number of
/// batches. Large runs should use large batches.
#[derive(Debug, Default)]
pub struct Memory {
    /// The next raw ORF identifier.
    pub(super) next_raw: u64,

    /// The next canonical ORF identifier.
    pub(super) next_orf: u64,

    /// The raw ORFs.
    pub(super) raw: BTreeMap<RawOrfId, RawOrf>,

    /// The raw ORFs by identity key.
    pub(super) raw_keys: HashMap<RawKey, RawOrfId>,

    /// The canonical ORFs.
    pub(super) orfs: BTreeMap<OrfId, CanonicalOrf>,

    /// The canonical ORFs by identity key.
    pub(super) orf_keys: HashMap<Key, OrfId>,

    /// The associations by canonical ORF and transcript.
    pub(super) associations: BTreeMap<(OrfId, TranscriptId), Association>,

    /// The canonical ORF each merged raw ORF contributes to.
    pub(super) merged: HashMap<RawOrfId, OrfId>,

    /// The gene conflicts by raw ORF.
    pub(super) conflicts: BTreeMap<RawOrfId, GeneConflict>,

    /// The derived namespace.
    pub(super) filtered: BTreeSet<OrfId>,

    /// The checkpoint of the last merge run.
    pub(super) checkpoint: Option<Checkpoint>,

    /// Where to write snapshots.
    pub(super) path: Option<PathBuf>,
}

impl Memory {
    /// Opens the store snapshot at `path`, creating an empty snapshot if the
    /// file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let mut store = match path.exists() {
            true => snapshot::load(&path).map_err(Error::Snapshot)?,
            false => {
                info!("creating a new store at {}", path.display());
                Self::default()
            }
        };

        store.path = Some(path);
        store.persist()?;

        Ok(store)
    }

    /// Gets the path of the snapshot backing the store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rebuilds the lookup indexes from the tables.
    pub(super) fn reindex(&mut self) {
        self.raw_keys = self.raw.values().map(|r| (r.key(), r.id())).collect();
        self.orf_keys = self.orfs.values().map(|o| (o.key(), o.id())).collect();
        self.merged = self
            .associations
            .values()
            .flat_map(|a| a.provenance().iter().map(|raw| (*raw, a.orf())))
            .collect();
    }

    /// Writes the snapshot. On failure, the store is rolled back to the
    /// last snapshot on disk.
    fn persist(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        if let Err(err) = snapshot::save(self, &path) {
            if path.exists() {
                let mut previous = snapshot::load(&path).map_err(Error::Snapshot)?;
                previous.path = Some(path);
                *self = previous;
            }

            return Err(Error::Snapshot(err));
        }

        Ok(())
    }

    /// Validates a changeset without applying it.
    fn validate(&self, changes: &Changeset) -> Result<()> {
        for contribution in &changes.contributions {
            let raw = self
                .raw
                .get(&contribution.raw)
                .ok_or_else(|| Error::Missing(contribution.raw.to_string()))?;

            if raw.liftover().locus().map(|l| l.key()).as_ref() != Some(&contribution.key) {
                return Err(Error::Permanent(format!(
                    "{} is not lifted onto {}",
                    contribution.raw, contribution.key
                )));
            }

            if contribution.targets.is_empty() {
                return Err(Error::Permanent(format!(
                    "{} has no transcript to associate with",
                    contribution.raw
                )));
            }

            if !self.orf_keys.contains_key(&contribution.key)
                && !changes.orfs.contains_key(&contribution.key)
            {
                return Err(Error::Missing(format!(
                    "canonical ORF {}",
                    contribution.key
                )));
            }
        }

        Ok(())
    }

    /// Gets the canonical ORF for `key`, creating it from the changeset if it
    /// does not exist yet.
    fn get_or_create_orf(
        &mut self,
        key: &Key,
        changes: &Changeset,
        committed: &mut Committed,
    ) -> OrfId {
        if let Some(id) = self.orf_keys.get(key) {
            return *id;
        }

        // Presence in the changeset is checked by `validate()`.
        let new = &changes.orfs[key];

        self.next_orf += 1;
        let id = OrfId(self.next_orf);

        self.orfs.insert(
            id,
            CanonicalOrf::new(id, new.locus.clone(), new.sequence.clone(), new.protein.clone()),
        );
        self.orf_keys.insert(key.clone(), id);
        committed.created += 1;

        id
    }
}

impl Store for Memory {
    fn insert_raw(&mut self, orf: NewRawOrf) -> Result<RawOrfId> {
        let key = orf.key();

        if self.raw_keys.contains_key(&key) {
            return Err(Error::DuplicateKey(key.to_string()));
        }

        self.next_raw += 1;
        let id = RawOrfId(self.next_raw);

        self.raw_keys.insert(key, id);
        self.raw.insert(id, RawOrf::from_new(id, orf));

        Ok(id)
    }

    fn get_or_insert_raw(&mut self, orf: NewRawOrf) -> Result<(RawOrfId, bool)> {
        match self.raw_keys.get(&orf.key()) {
            Some(id) => Ok((*id, false)),
            None => self.insert_raw(orf).map(|id| (id, true)),
        }
    }

    fn raw(&self, id: RawOrfId) -> Result<Option<RawOrf>> {
        Ok(self.raw.get(&id).cloned())
    }

    fn raw_page(&self, after: Option<RawOrfId>, limit: usize) -> Result<Vec<RawOrf>> {
        let start = after.map(|id| RawOrfId(id.0 + 1)).unwrap_or(RawOrfId(0));
        Ok(self.raw.range(start..).take(limit).map(|(_, r)| r.clone()).collect())
    }

    fn set_liftover(&mut self, id: RawOrfId, liftover: Liftover) -> Result<()> {
        let raw = self
            .raw
            .get_mut(&id)
            .ok_or_else(|| Error::Missing(id.to_string()))?;

        raw.set_liftover(liftover);
        Ok(())
    }

    fn unmerged(&self) -> Result<Vec<RawOrfId>> {
        Ok(self
            .raw
            .keys()
            .filter(|id| !self.merged.contains_key(id))
            .copied()
            .collect())
    }

    fn merged_into(&self, raw: RawOrfId) -> Result<Option<OrfId>> {
        Ok(self.merged.get(&raw).copied())
    }

    fn orf(&self, id: OrfId) -> Result<Option<CanonicalOrf>> {
        Ok(self.orfs.get(&id).cloned())
    }

    fn orf_by_key(&self, key: &Key) -> Result<Option<CanonicalOrf>> {
        Ok(self
            .orf_keys
            .get(key)
            .and_then(|id| self.orfs.get(id))
            .cloned())
    }

    fn orf_page(&self, after: Option<OrfId>, limit: usize) -> Result<Vec<CanonicalOrf>> {
        let start = after.map(|id| OrfId(id.0 + 1)).unwrap_or(OrfId(0));
        Ok(self.orfs.range(start..).take(limit).map(|(_, o)| o.clone()).collect())
    }

    fn associations(&self, orf: OrfId) -> Result<Vec<Association>> {
        Ok(self
            .associations
            .range((orf, TranscriptId::new(""))..)
            .take_while(|((id, _), _)| *id == orf)
            .map(|(_, a)| a.clone())
            .collect())
    }

    fn conflicts(&self) -> Result<Vec<GeneConflict>> {
        Ok(self.conflicts.values().cloned().collect())
    }

    fn commit(&mut self, changes: Changeset) -> Result<Committed> {
        self.validate(&changes)?;

        let mut committed = Committed::default();

        for contribution in &changes.contributions {
            if self.merged.contains_key(&contribution.raw) {
                committed.duplicates += 1;
                continue;
            }

            let id = self.get_or_create_orf(&contribution.key, &changes, &mut committed);
            let ambiguous = contribution.conflict.is_some();

            for target in &contribution.targets {
                self.associations
                    .entry((id, target.transcript.clone()))
                    .or_insert_with(|| {
                        Association::new(id, target.transcript.clone(), target.gene.clone())
                    })
                    .add_provenance(contribution.raw, ambiguous);
            }

            if let Some(orf) = self.orfs.get_mut(&id) {
                orf.add_contribution(ambiguous);
            }

            if let Some(conflict) = &contribution.conflict {
                self.conflicts
                    .entry(contribution.raw)
                    .or_insert_with(|| conflict.clone());
            }

            self.merged.insert(contribution.raw, id);
            committed.merged += 1;
        }

        if let Some(checkpoint) = changes.checkpoint {
            self.checkpoint = Some(checkpoint);
        }

        self.persist()?;

        debug!(
            "committed {} merges ({} new ORFs, {} duplicates)",
            committed.merged, committed.created, committed.duplicates
        );

        Ok(committed)
    }

    fn update_association(&mut self, association: &Association) -> Result<()> {
        let key = (association.orf(), association.transcript().clone());

        let Some(stored) = self.associations.get_mut(&key) else {
            return Err(Error::Missing(format!(
                "association of {} with {}",
                association.orf(),
                association.transcript()
            )));
        };

        stored.annotate_from(association);
        self.persist()
    }

    fn remove_source(&mut self, source: &SourceId) -> Result<usize> {
        let ids = self
            .raw
            .values()
            .filter(|r| r.source() == source)
            .map(|r| r.id())
            .collect::<Vec<_>>();

        for id in &ids {
            if let Some(raw) = self.raw.remove(id) {
                self.raw_keys.remove(&raw.key());
            }

            let ambiguous = self.conflicts.remove(id).is_some();

            if let Some(orf) = self.merged.remove(id) {
                if let Some(canonical) = self.orfs.get_mut(&orf) {
                    canonical.remove_contribution(ambiguous);
                }

                let conflicts = &self.conflicts;
                self.associations.retain(|(owner, _), association| {
                    if *owner == orf {
                        association.remove_provenance(*id, |raw| conflicts.contains_key(&raw));
                        !association.provenance().is_empty()
                    } else {
                        true
                    }
                });
            }
        }

        info!("removed {} raw ORFs of source {source}", ids.len());
        self.persist()?;

        Ok(ids.len())
    }

    fn replace_filtered(&mut self, orfs: Vec<OrfId>) -> Result<()> {
        if let Some(missing) = orfs.iter().find(|id| !self.orfs.contains_key(id)) {
            return Err(Error::Missing(missing.to_string()));
        }

        self.filtered = orfs.into_iter().collect();
        self.persist()
    }

    fn filtered(&self) -> Result<Vec<OrfId>> {
        Ok(self.filtered.iter().copied().collect())
    }

    fn checkpoint(&self) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoint.clone())
    }

    fn flush(&mut self) -> Result<()> {
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Target;
    use crate::core::Locus;
    use crate::core::Strand;
    use crate::orf::Assembly;
    use crate::store::Contribution;
    use crate::store::NewOrf;

    fn lifted(store: &mut Memory, source: &str, start: u64) -> RawOrfId {
        let locus = Locus::try_new("1", Strand::Positive, start, start + 300, vec![], vec![]).unwrap();
        let id = store
            .insert_raw(NewRawOrf::new(
                SourceId::new(source),
                Assembly::new("GRCh38"),
                locus.clone(),
            ))
            .unwrap();
        store
            .set_liftover(id, Liftover::Mapped { locus, length_diff: 0 })
            .unwrap();
        id
    }

    fn contribution(store: &Memory, raw: RawOrfId, transcripts: &[&str]) -> (Changeset, Key) {
        let locus = store.raw[&raw].liftover().locus().unwrap().clone();
        let key = locus.key();

        let mut changes = Changeset::default();
        changes.orfs.insert(
            key.clone(),
            NewOrf {
                locus,
                sequence: String::from("ATG"),
                protein: String::from("M"),
            },
        );
        changes.contributions.push(Contribution {
            raw,
            key: key.clone(),
            targets: transcripts
                .iter()
                .map(|t| Target {
                    transcript: TranscriptId::new(*t),
                    gene: String::from("G1"),
                })
                .collect(),
            conflict: None,
        });

        (changes, key)
    }

    #[test]
    fn test_raw_keys_are_unique() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut store = Memory::default();
        let locus = Locus::try_new("1", Strand::Positive, 100, 400, vec![], vec![])?;
        let orf = NewRawOrf::new(SourceId::new("X"), Assembly::new("GRCh38"), locus);

        let id = store.insert_raw(orf.clone())?;
        assert!(matches!(
            store.insert_raw(orf.clone()),
            Err(Error::DuplicateKey(_))
        ));
        assert_eq!(store.get_or_insert_raw(orf)?, (id, false));

        Ok(())
    }

    #[test]
    fn test_commit_is_idempotent() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut store = Memory::default();
        let raw = lifted(&mut store, "X", 100);
        let (changes, key) = contribution(&store, raw, &["T1", "T2"]);

        let first = store.commit(changes.clone())?;
        assert_eq!(first.created, 1);
        assert_eq!(first.merged, 1);

        let second = store.commit(changes)?;
        assert_eq!(second.created, 0);
        assert_eq!(second.duplicates, 1);

        let orf = store.orf_by_key(&key)?.unwrap();
        assert_eq!(orf.count_ds(), 1);
        assert_eq!(store.associations(orf.id())?.len(), 2);
        assert!(store.unmerged()?.is_empty());

        Ok(())
    }

    #[test]
    fn test_invalid_changesets_change_nothing() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let mut store = Memory::default();
        let good = lifted(&mut store, "X", 100);
        let bad = lifted(&mut store, "Y", 1000);

        let (mut changes, _) = contribution(&store, good, &["T1"]);
        let (other, _) = contribution(&store, bad, &["T1"]);

        // The second contribution names a canonical ORF that neither exists
        // nor is created by the changeset.
        changes.contributions.extend(other.contributions);

        assert!(matches!(store.commit(changes), Err(Error::Missing(_))));
        assert!(store.orfs.is_empty());
        assert_eq!(store.unmerged()?, vec![good, bad]);

        Ok(())
    }

    #[test]
    fn test_removing_a_source_keeps_the_orf() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let mut store = Memory::default();
        let x = lifted(&mut store, "X", 100);
        let y = lifted(&mut store, "Y", 100);

        let (changes, key) = contribution(&store, x, &["T1"]);
        store.commit(changes)?;
        let (changes, _) = contribution(&store, y, &["T1", "T2"]);
        store.commit(changes)?;

        let id = store.orf_by_key(&key)?.unwrap().id();
        assert_eq!(store.orf(id)?.unwrap().count_ds(), 2);

        assert_eq!(store.remove_source(&SourceId::new("Y"))?, 1);

        let orf = store.orf(id)?.unwrap();
        assert_eq!(orf.count_ds(), 1);

        let associations = store.associations(id)?;
        assert_eq!(associations.len(), 1);
        assert_eq!(associations[0].transcript().as_str(), "T1");
        assert_eq!(store.raw(y)?, None);

        Ok(())
    }

    #[test]
    fn test_removing_the_ambiguous_source_clears_conflicts(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut store = Memory::default();
        let x = lifted(&mut store, "X", 100);
        let y = lifted(&mut store, "Y", 100);

        let (mut changes, key) = contribution(&store, x, &["T1"]);
        changes.contributions[0].conflict = Some(GeneConflict {
            raw: x,
            locus: store.raw[&x].liftover().locus().unwrap().clone(),
            genes: ["G1", "G2"].into_iter().map(String::from).collect(),
            transcripts: [TranscriptId::new("T1")].into_iter().collect(),
        });
        store.commit(changes)?;
        let (changes, _) = contribution(&store, y, &["T1"]);
        store.commit(changes)?;

        let id = store.orf_by_key(&key)?.unwrap().id();
        assert!(store.associations(id)?[0].conflict());

        store.remove_source(&SourceId::new("X"))?;

        let orf = store.orf(id)?.unwrap();
        assert_eq!(orf.count_ds(), 1);
        assert_eq!(orf.count_ds_ambiguous(), 0);
        assert!(store.conflicts()?.is_empty());

        let associations = store.associations(id)?;
        assert_eq!(associations[0].provenance().iter().copied().collect::<Vec<_>>(), [y]);
        assert!(!associations[0].conflict());

        Ok(())
    }

    #[test]
    fn test_update_association_keeps_provenance(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut store = Memory::default();
        let raw = lifted(&mut store, "X", 100);
        let (changes, key) = contribution(&store, raw, &["T1"]);
        store.commit(changes)?;

        let id = store.orf_by_key(&key)?.unwrap().id();

        let mut annotated = Association::new(id, TranscriptId::new("T1"), "G1");
        annotated.set_relative_coordinates(50, 350);
        annotated.set_score(0.5);
        store.update_association(&annotated)?;

        let stored = store.associations(id)?.remove(0);
        assert_eq!(stored.relative_coordinates(), Some((50, 350)));
        assert_eq!(stored.score(), Some(0.5));
        assert_eq!(stored.provenance().len(), 1);

        let unknown = Association::new(id, TranscriptId::new("T9"), "G1");
        assert!(matches!(
            store.update_association(&unknown),
            Err(Error::Missing(_))
        ));

        Ok(())
    }

    #[test]
    fn test_paging() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut store = Memory::default();
        let ids = (0..5)
            .map(|i| lifted(&mut store, "X", i * 1000))
            .collect::<Vec<_>>();

        let first = store.raw_page(None, 2)?;
        assert_eq!(first.iter().map(|r| r.id()).collect::<Vec<_>>(), ids[..2]);

        let rest = store.raw_page(Some(ids[1]), 10)?;
        assert_eq!(rest.len(), 3);

        Ok(())
    }
}
