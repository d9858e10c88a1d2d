//! A liftover oracle backed by UCSC chain files.
//!
//! Each chain file maps one assembly onto another. A [`Chains`] registry holds
//! one [`Machine`] per (from, to) pair of assemblies and serves as an
//! [`Oracle`].

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::core::Position;
use crate::core::Strand;
use crate::liftover::Lifted;
use crate::liftover::Oracle;
use crate::orf::Assembly;
use crate::service::ServiceError;

pub mod machine;
pub mod reader;
pub mod record;

pub use machine::Machine;
pub use reader::Reader;

/// An error related to loading chain files.
#[derive(Debug)]
pub enum Error {
    /// The chain file could not be opened.
    Io(std::io::Error),

    /// The chain file could not be turned into a liftover machine.
    Machine(machine::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::Machine(err) => write!(f, "invalid chain file: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A registry of liftover machines keyed by (from, to) assembly.
#[derive(Debug, Default)]
pub struct Chains {
    /// The machines.
    machines: HashMap<(Assembly, Assembly), Machine>,
}

impl Chains {
    /// Registers a machine lifting `from` onto `to`.
    pub fn insert(&mut self, from: Assembly, to: Assembly, machine: Machine) {
        self.machines.insert((from, to), machine);
    }

    /// Loads the chain file at `path` (gzip-compressed if it ends in `.gz`)
    /// and registers it as lifting `from` onto `to`.
    pub fn load(&mut self, from: Assembly, to: Assembly, path: &Path) -> Result<(), Error> {
        let reader = Reader::new(crate::io::open(path).map_err(Error::Io)?);
        let machine = machine::Builder
            .try_build_from(reader)
            .map_err(Error::Machine)?;

        info!("loaded chain file {} ({from} -> {to})", path.display());
        self.insert(from, to, machine);

        Ok(())
    }
}

impl Oracle for Chains {
    fn lift(
        &self,
        chromosome: &str,
        strand: Strand,
        position: Position,
        from: &Assembly,
        to: &Assembly,
    ) -> Result<Option<Lifted>, ServiceError> {
        if from == to {
            return Ok(Some(Lifted::new(chromosome, strand, position)));
        }

        let machine = self
            .machines
            .get(&(from.clone(), to.clone()))
            .ok_or_else(|| ServiceError::Rejected(format!("no chain file from {from} to {to}")))?;

        Ok(machine.lift(chromosome, strand, position))
    }
}
