//! `orfdb` is a crate for curating a database of open reading frames (ORFs)
//! reported by many datasets.
//!
//! Each dataset reports ORFs in the coordinates of some genome assembly. The
//! crate takes those raw observations through the following stages:
//!
//! 1. **Ingestion.** A [`source::Parser`] turns a dataset into raw ORFs, which
//!    are stored once per (source, locus) pair ([`pipeline::insert()`]).
//! 2. **Liftover.** Every exon boundary of a raw ORF is lifted onto the current
//!    assembly by a [`liftover::Oracle`] such as a chain file
//!    ([`pipeline::lift_pending()`]). A raw ORF with any unmapped boundary is
//!    not lifted at all.
//! 3. **Merging.** Lifted raw ORFs with the same locus become one
//!    [`orf::CanonicalOrf`], linked to the transcripts its locus overlaps
//!    ([`merge`]). A [`driver::Driver`] runs merges in batches that commit on
//!    their own and can be resumed after a failure.
//! 4. **Derived outputs.** Canonical ORFs can be [`filter`]ed, [`export`]ed as
//!    BED, GFF3, or FASTA, and summarized ([`stats`]).
//!
//! Below is the whole flow for one raw ORF that is already on the current
//! assembly.
//!
//! ```
//! use orfdb::annotation::Index;
//! use orfdb::driver::Driver;
//! use orfdb::liftover::Identity;
//! use orfdb::merge::Services;
//! use orfdb::orf::Assembly;
//! use orfdb::orf::SourceId;
//! use orfdb::pipeline;
//! use orfdb::sequence::Fasta;
//! use orfdb::service::RetryPolicy;
//! use orfdb::source::Tabular;
//! use orfdb::store::Memory;
//! use orfdb::store::Store;
//! use orfdb::workers::Workers;
//!
//! let gtf = "1\tsrc\ttranscript\t1\t60\t.\t+\t.\tgene_id \"G1\"; gene_name \"ABC\"; transcript_id \"T1\";\n";
//! let annotation = Index::from_readers(gtf.as_bytes(), None::<&[u8]>)?;
//! let reference = Fasta::from_sequences([("1", b"CCATGAAATAGCC".to_vec())]);
//!
//! let current = Assembly::new("GRCh38");
//! let policy = RetryPolicy::default();
//! let workers = Workers::default();
//! let mut store = Memory::default();
//!
//! let data = "chromosome\tstrand\tstart\tstop\n1\t+\t2\t11\n";
//! pipeline::insert(
//!     &mut store,
//!     &Tabular::tsv(),
//!     &SourceId::new("X"),
//!     &current,
//!     &mut data.as_bytes(),
//! )?;
//! pipeline::lift_pending(&mut store, &Identity, &policy, &workers, &current, 100)?;
//!
//! let services = Services {
//!     annotation: &annotation,
//!     sequence: &reference,
//!     policy: &policy,
//! };
//! let run = Driver::new(&mut store, services, &workers).run()?;
//! assert_eq!(run.report.created, 1);
//!
//! let orf = store.orf_page(None, 1)?.remove(0);
//! assert_eq!(orf.protein(), "MK*");
//! assert_eq!(orf.count_ds(), 1);
//!
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod annotation;
pub mod config;
pub mod core;
pub mod driver;
pub mod export;
pub mod filter;
pub mod io;
pub mod liftover;
pub mod merge;
pub mod orf;
pub mod pipeline;
pub mod sequence;
pub mod service;
pub mod source;
pub mod stats;
pub mod store;
pub mod workers;

#[cfg(test)]
mod testing;
