//! Opening and creating files that may be gzip-compressed.
//!
//! A path ending in `.gz` is read through a gzip decoder and written through
//! a gzip encoder. Anything else is treated as plain text.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write;
use std::io::{self};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Whether or not the path ends in `.gz`.
pub fn is_gzipped(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("gz")
}

/// Opens a file for buffered reading.
pub fn open(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;

    match is_gzipped(path) {
        true => Ok(Box::new(BufReader::new(MultiGzDecoder::new(file)))),
        false => Ok(Box::new(BufReader::new(file))),
    }
}

/// A writer that may need finishing before it is dropped.
#[derive(Debug)]
pub enum Writer {
    /// A plain-text writer.
    Plain(BufWriter<File>),

    /// A gzip-compressing writer.
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Writer {
    /// Flushes all data and, for gzip, writes the trailer.
    pub fn finish(self) -> io::Result<()> {
        match self {
            Writer::Plain(mut inner) => inner.flush(),
            Writer::Gzip(inner) => inner.finish()?.flush(),
        }
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(inner) => inner.write(buf),
            Writer::Gzip(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(inner) => inner.flush(),
            Writer::Gzip(inner) => inner.flush(),
        }
    }
}

/// Creates (or truncates) a file for buffered writing.
pub fn create(path: &Path) -> io::Result<Writer> {
    let file = BufWriter::new(File::create(path)?);

    match is_gzipped(path) {
        true => Ok(Writer::Gzip(GzEncoder::new(file, Compression::default()))),
        false => Ok(Writer::Plain(file)),
    }
}
