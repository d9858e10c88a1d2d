//! Core functionality used across the crate.

pub mod locus;
pub mod strand;

pub use locus::Exon;
pub use locus::Key;
pub use locus::Locus;
pub use locus::Position;
pub use strand::Strand;
