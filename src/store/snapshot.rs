//! Saving and loading [`Memory`] stores as JSON.
//!
//! Snapshots are gzip-compressed when the path ends in `.gz`. A snapshot is
//! first written next to its destination and then renamed over it, so a
//! crash while saving leaves the previous snapshot intact.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::driver::Checkpoint;
use crate::orf::Association;
use crate::orf::CanonicalOrf;
use crate::orf::GeneConflict;
use crate::orf::OrfId;
use crate::orf::RawOrf;
use crate::store::Memory;

/// The version of the snapshot layout.
const VERSION: u32 = 1;

/// An error related to a snapshot.
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(std::io::Error),

    /// A (de)serialization error.
    Json(serde_json::Error),

    /// A snapshot written by an incompatible version.
    UnsupportedVersion(u32),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::Json(err) => write!(f, "json error: {err}"),
            Error::UnsupportedVersion(version) => write!(
                f,
                "unsupported snapshot version: expected {VERSION}, found {version}"
            ),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

/// The tables of a store, borrowed for writing.
#[derive(Serialize)]
struct TablesRef<'a> {
    /// The snapshot layout version.
    version: u32,
    /// The next raw ORF identifier.
    next_raw: u64,
    /// The next canonical ORF identifier.
    next_orf: u64,
    /// The raw ORFs.
    raw: Vec<&'a RawOrf>,
    /// The canonical ORFs.
    orfs: Vec<&'a CanonicalOrf>,
    /// The associations.
    associations: Vec<&'a Association>,
    /// The gene conflicts.
    conflicts: Vec<&'a GeneConflict>,
    /// The derived namespace.
    filtered: &'a BTreeSet<OrfId>,
    /// The checkpoint.
    checkpoint: Option<&'a Checkpoint>,
}

/// The tables of a store, owned after reading.
#[derive(Deserialize)]
struct Tables {
    /// The snapshot layout version.
    version: u32,
    /// The next raw ORF identifier.
    next_raw: u64,
    /// The next canonical ORF identifier.
    next_orf: u64,
    /// The raw ORFs.
    raw: Vec<RawOrf>,
    /// The canonical ORFs.
    orfs: Vec<CanonicalOrf>,
    /// The associations.
    associations: Vec<Association>,
    /// The gene conflicts.
    conflicts: Vec<GeneConflict>,
    /// The derived namespace.
    #[serde(default)]
    filtered: BTreeSet<OrfId>,
    /// The checkpoint.
    #[serde(default)]
    checkpoint: Option<Checkpoint>,
}

/// Gets the temporary path a snapshot is written to before it is renamed.
fn partial(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("store"));
    name.push(".partial");

    // `.gz` stays last so the partial file is compressed too.
    if crate::io::is_gzipped(path) {
        name.push(".gz");
    }

    path.with_file_name(name)
}

/// Saves a store to `path`.
pub fn save(store: &Memory, path: &Path) -> Result<()> {
    let tables = TablesRef {
        version: VERSION,
        next_raw: store.next_raw,
        next_orf: store.next_orf,
        raw: store.raw.values().collect(),
        orfs: store.orfs.values().collect(),
        associations: store.associations.values().collect(),
        conflicts: store.conflicts.values().collect(),
        filtered: &store.filtered,
        checkpoint: store.checkpoint.as_ref(),
    };

    let tmp = partial(path);
    let mut writer = crate::io::create(&tmp).map_err(Error::Io)?;
    serde_json::to_writer(&mut writer, &tables).map_err(Error::Json)?;
    writer.finish().map_err(Error::Io)?;
    std::fs::rename(&tmp, path).map_err(Error::Io)?;

    debug!(
        "saved {} raw and {} canonical ORFs to {}",
        tables.raw.len(),
        tables.orfs.len(),
        path.display()
    );

    Ok(())
}

/// Loads a store from `path`. The loaded store is not attached to the path:
/// use [`Memory::open()`] for a store that saves itself.
pub fn load(path: &Path) -> Result<Memory> {
    let reader = crate::io::open(path).map_err(Error::Io)?;
    let tables: Tables = serde_json::from_reader(reader).map_err(Error::Json)?;

    if tables.version != VERSION {
        return Err(Error::UnsupportedVersion(tables.version));
    }

    let mut store = Memory {
        next_raw: tables.next_raw,
        next_orf: tables.next_orf,
        raw: tables.raw.into_iter().map(|r| (r.id(), r)).collect(),
        orfs: tables.orfs.into_iter().map(|o| (o.id(), o)).collect(),
        associations: tables
            .associations
            .into_iter()
            .map(|a| ((a.orf(), a.transcript().clone()), a))
            .collect::<BTreeMap<_, _>>(),
        conflicts: tables.conflicts.into_iter().map(|c| (c.raw, c)).collect(),
        filtered: tables.filtered,
        checkpoint: tables.checkpoint,
        ..Default::default()
    };

    store.reindex();

    Ok(store)
}
