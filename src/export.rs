//! Writing canonical ORFs for genome browsers and downstream tools.
//!
//! Coordinates are written as stored (0-based, half-open) in BED and shifted
//! to 1-based, fully-closed in GFF3.

use std::io;
use std::io::Write;

use noodles::fasta;

use crate::core::Strand;
use crate::orf::CanonicalOrf;
use crate::store;
use crate::store::Store;

/// The number of canonical ORFs read per page.
const PAGE_SIZE: usize = 10_000;

/// The highest score a BED line may carry.
const MAX_BED_SCORE: u64 = 1000;

/// The GFF3 source column.
const GFF_SOURCE: &str = "orfdb";

/// Gets the canonical ORFs to export in ascending order: the derived
/// namespace if `filtered` is set, otherwise every canonical ORF.
pub fn collect<S>(store: &S, filtered: bool) -> store::Result<Vec<CanonicalOrf>>
where
    S: Store + ?Sized,
{
    if filtered {
        let mut orfs = Vec::new();

        for id in store.filtered()? {
            // Filtered ORFs whose record is gone are skipped.
            if let Some(orf) = store.orf(id)? {
                orfs.push(orf);
            }
        }

        return Ok(orfs);
    }

    let mut orfs = Vec::new();
    let mut after = None;

    loop {
        let page = store.orf_page(after, PAGE_SIZE)?;

        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id());

        orfs.extend(page);
    }

    Ok(orfs)
}

/// Joins positions into a comma-terminated list, as UCSC tools write them.
fn list(values: impl Iterator<Item = u64>) -> String {
    values.map(|v| format!("{v},")).collect()
}

/// Writes one BED12 line per canonical ORF. The score is the number of
/// contributing raw ORFs (capped at 1000) and the blocks are the exons.
///
/// # Examples
///
/// ```
/// use orfdb::core::Locus;
/// use orfdb::core::Strand;
/// use orfdb::export;
/// use orfdb::orf::CanonicalOrf;
/// use orfdb::orf::OrfId;
///
/// let locus = Locus::try_new("1", Strand::Negative, 100, 400, vec![100, 300], vec![200, 400])?;
/// let mut orf = CanonicalOrf::new(OrfId(7), locus, String::new(), String::new());
/// orf.add_contribution(false);
///
/// let mut out = Vec::new();
/// export::write_bed(&mut out, &[orf])?;
///
/// assert_eq!(
///     String::from_utf8(out)?,
///     "1\t100\t400\torf:7\t1\t-\t100\t400\t0\t2\t100,100,\t0,200,\n"
/// );
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn write_bed<W>(writer: &mut W, orfs: &[CanonicalOrf]) -> io::Result<()>
where
    W: Write,
{
    for orf in orfs {
        let locus = orf.locus();
        let exons = locus.exons();

        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t0\t{}\t{}\t{}",
            locus.chromosome(),
            locus.start(),
            locus.stop(),
            orf.id(),
            orf.count_ds().min(MAX_BED_SCORE),
            locus.strand(),
            locus.start(),
            locus.stop(),
            exons.len(),
            list(exons.iter().map(|e| e.len())),
            list(exons.iter().map(|e| e.start() - locus.start())),
        )?;
    }

    Ok(())
}

/// Writes one GFF3 `CDS` line per exon, with the phase counted from the
/// start codon.
pub fn write_gff<W>(writer: &mut W, orfs: &[CanonicalOrf]) -> io::Result<()>
where
    W: Write,
{
    writeln!(writer, "##gff-version 3")?;

    for orf in orfs {
        let locus = orf.locus();
        let mut exons = locus.exons().into_iter().collect::<Vec<_>>();

        if locus.strand() == Strand::Negative {
            exons.reverse();
        }

        let mut done = 0;

        for exon in exons {
            let phase = (3 - done % 3) % 3;

            writeln!(
                writer,
                "{}\t{GFF_SOURCE}\tCDS\t{}\t{}\t{}\t{}\t{phase}\tID={};count_ds={};count_ds_ambiguous={}",
                locus.chromosome(),
                exon.start() + 1,
                exon.end(),
                orf.count_ds(),
                locus.strand(),
                orf.id(),
                orf.count_ds(),
                orf.count_ds_ambiguous(),
            )?;

            done += exon.len();
        }
    }

    Ok(())
}

/// Writes the amino-acid sequence of every canonical ORF as FASTA.
pub fn write_fasta<W>(writer: W, orfs: &[CanonicalOrf]) -> io::Result<()>
where
    W: Write,
{
    let mut writer = fasta::Writer::new(writer);

    for orf in orfs {
        let definition = fasta::record::Definition::new(orf.id().to_string(), None);
        let sequence = fasta::record::Sequence::from(orf.protein().as_bytes().to_vec());

        writer.write_record(&fasta::Record::new(definition, sequence))?;
    }

    Ok(())
}
