//! A chain file reader.

use std::io::BufRead;
use std::io::{self};

use crate::liftover::chain::record;
use crate::liftover::chain::record::Line;

/// The new line character.
const NEW_LINE: char = '\n';

/// The carriage return character.
const CARRIAGE_RETURN: char = '\r';

/// An error related to a [`Reader`].
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(io::Error),

    /// A line that could not be parsed.
    Line(usize, record::ParseError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::Line(line_no, err) => write!(f, "line {line_no}: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A chain file reader.
#[derive(Clone, Debug)]
pub struct Reader<T>
where
    T: BufRead,
{
    /// The inner reader.
    inner: T,

    /// The number of lines read so far.
    line_no: usize,
}

impl<T> Reader<T>
where
    T: BufRead,
{
    /// Creates a chain file reader.
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::liftover::chain::Reader;
    ///
    /// let data = b"chain 0 seq0 4 + 0 4 seq0 5 - 0 5 1\n3\t0\t1\n1";
    /// let reader = Reader::new(&data[..]);
    /// ```
    pub fn new(inner: T) -> Self {
        Self { inner, line_no: 0 }
    }

    /// Attempts to read a [`Line`] from the underlying reader.
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::liftover::chain::record::Line;
    /// use orfdb::liftover::chain::Reader;
    ///
    /// let data = b"chain 0 seq0 4 + 0 4 seq0 5 - 0 5 1\n3\t0\t1\n1";
    /// let mut reader = Reader::new(&data[..]);
    ///
    /// let mut buffer = String::new();
    /// assert!(matches!(reader.read_line(&mut buffer)?, Some(Line::Header(_))));
    /// assert!(matches!(reader.read_line(&mut buffer)?, Some(Line::Block(_))));
    /// assert!(matches!(reader.read_line(&mut buffer)?, Some(Line::Block(_))));
    /// assert!(reader.read_line(&mut buffer)?.is_none());
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn read_line(&mut self, buffer: &mut String) -> Result<Option<Line>, Error> {
        match read_line(&mut self.inner, buffer).map_err(Error::Io)? {
            0 => Ok(None),
            _ => {
                self.line_no += 1;
                buffer
                    .parse::<Line>()
                    .map(Some)
                    .map_err(|err| Error::Line(self.line_no, err))
            }
        }
    }
}

/// Reads a line from a buffered reader, stripping the line ending.
fn read_line<T>(reader: &mut T, buffer: &mut String) -> io::Result<usize>
where
    T: BufRead,
{
    buffer.clear();

    match reader.read_line(buffer) {
        Ok(0) => Ok(0),
        Ok(n) => {
            if buffer.ends_with(NEW_LINE) {
                buffer.pop();

                if buffer.ends_with(CARRIAGE_RETURN) {
                    buffer.pop();
                }
            }

            Ok(n)
        }
        Err(e) => Err(e),
    }
}
