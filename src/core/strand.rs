//! The strand upon which a locus is located.

use std::io;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// An error related to the parsing of a strand.
#[derive(Debug)]
pub struct ParseStrandError(io::Error);

impl std::fmt::Display for ParseStrandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse strand error: {}", self.0)
    }
}

impl std::error::Error for ParseStrandError {}

/// The strand of a locus.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum Strand {
    /// The positive strand (`+`).
    #[serde(rename = "+")]
    Positive,
    /// The negative strand (`-`).
    #[serde(rename = "-")]
    Negative,
}

impl Strand {
    /// Returns the opposite strand.
    ///
    /// # Examples
    ///
    /// ```
    /// use orfdb::core::Strand;
    ///
    /// assert_eq!(Strand::Positive.complement(), Strand::Negative);
    /// assert_eq!(Strand::Negative.complement(), Strand::Positive);
    /// ```
    pub fn complement(&self) -> Strand {
        match self {
            Strand::Positive => Strand::Negative,
            Strand::Negative => Strand::Positive,
        }
    }
}

impl FromStr for Strand {
    type Err = ParseStrandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Positive),
            "-" => Ok(Self::Negative),
            c => Err(ParseStrandError(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a valid strand", c),
            ))),
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strand::Positive => write!(f, "+"),
            Strand::Negative => write!(f, "-"),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_strand_from_str() -> Result<(), Box<dyn std::error::Error>> {
        let strand: Strand = "+".parse()?;
        assert_eq!(strand, Strand::Positive);

        let strand: Strand = "-".parse()?;
        assert_eq!(strand, Strand::Negative);

        let err = "?".parse::<Strand>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "parse strand error: ? is not a valid strand"
        );

        Ok(())
    }

    #[test]
    fn test_strand_serde_uses_symbols() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(serde_json::to_string(&Strand::Negative)?, "\"-\"");
        let strand: Strand = serde_json::from_str("\"+\"")?;
        assert_eq!(strand, Strand::Positive);
        Ok(())
    }
}
