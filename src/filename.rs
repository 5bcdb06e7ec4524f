//! Science filename parsing.
//!
//! Every data product follows the naming convention
//!
//! ```text
//! <mission>_<instrument>_<data_level>_<descriptor>_<start_date>_<end_date>_<version>.<extension>
//! ```
//!
//! with dates as `YYYYMMDD` and versions as `vNN-NN`. Raw telemetry (`l0`)
//! is stored as `pkts`; every processed level is stored as `cdf`.
//!
//! Parsing is pure: the same filename always yields the same result.

use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Extension required for the lowest (raw) data level.
pub const RAW_EXTENSION: &str = "pkts";
/// Extension required for every processed data level.
pub const PROCESSED_EXTENSION: &str = "cdf";

const DATE_FORMAT: &str = "%Y%m%d";

/// Processing stage of a data product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataLevel {
    L0,
    L1,
    L1a,
    L1b,
    L1c,
    L1ca,
    L1cb,
    L1d,
    L2,
    L2pre,
    L3,
    L3a,
    L3b,
    L3c,
    L3d,
}

impl DataLevel {
    pub const ALL: [DataLevel; 15] = [
        DataLevel::L0,
        DataLevel::L1,
        DataLevel::L1a,
        DataLevel::L1b,
        DataLevel::L1c,
        DataLevel::L1ca,
        DataLevel::L1cb,
        DataLevel::L1d,
        DataLevel::L2,
        DataLevel::L2pre,
        DataLevel::L3,
        DataLevel::L3a,
        DataLevel::L3b,
        DataLevel::L3c,
        DataLevel::L3d,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataLevel::L0 => "l0",
            DataLevel::L1 => "l1",
            DataLevel::L1a => "l1a",
            DataLevel::L1b => "l1b",
            DataLevel::L1c => "l1c",
            DataLevel::L1ca => "l1ca",
            DataLevel::L1cb => "l1cb",
            DataLevel::L1d => "l1d",
            DataLevel::L2 => "l2",
            DataLevel::L2pre => "l2pre",
            DataLevel::L3 => "l3",
            DataLevel::L3a => "l3a",
            DataLevel::L3b => "l3b",
            DataLevel::L3c => "l3c",
            DataLevel::L3d => "l3d",
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, DataLevel::L0)
    }

    /// The only extension a file at this level may carry.
    pub fn expected_extension(&self) -> &'static str {
        if self.is_raw() {
            RAW_EXTENSION
        } else {
            PROCESSED_EXTENSION
        }
    }
}

impl fmt::Display for DataLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| ParseError::InvalidDataLevel(s.to_string()))
    }
}

/// Why a filename was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid filename {filename}: {reason}")]
    Malformed { filename: String, reason: String },

    #[error("Invalid data level: {0}")]
    InvalidDataLevel(String),

    #[error(
        "Invalid extension. Extension should be pkts for data level l0 and cdf for data level higher than l0"
    )]
    InvalidExtension { level: DataLevel, extension: String },

    #[error("Invalid date {0}: expected YYYYMMDD")]
    InvalidDate(String),

    #[error("Invalid version {0}: expected vNN-NN")]
    InvalidVersion(String),

    #[error("Invalid mission {found}: expected {expected}")]
    InvalidMission { expected: String, found: String },
}

/// A parsed science filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScienceFilename {
    pub mission: String,
    pub instrument: String,
    pub data_level: DataLevel,
    pub descriptor: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub version: String,
    pub extension: String,
}

impl ScienceFilename {
    /// Parses a bare filename (no directory components).
    pub fn parse(filename: &str) -> Result<Self, ParseError> {
        let malformed = |reason: &str| ParseError::Malformed {
            filename: filename.to_string(),
            reason: reason.to_string(),
        };

        let (stem, extension) = filename
            .rsplit_once('.')
            .ok_or_else(|| malformed("missing extension"))?;

        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() != 7 {
            return Err(malformed(
                "expected <mission>_<instrument>_<data_level>_<descriptor>_<start_date>_<end_date>_<version>",
            ));
        }
        if parts.iter().any(|p| p.is_empty()) || extension.is_empty() {
            return Err(malformed("empty field"));
        }

        let data_level = DataLevel::from_str(parts[2])?;
        if extension != data_level.expected_extension() {
            return Err(ParseError::InvalidExtension {
                level: data_level,
                extension: extension.to_string(),
            });
        }

        let start_date = parse_date(parts[4])?;
        let end_date = parse_date(parts[5])?;
        validate_version(parts[6])?;

        Ok(Self {
            mission: parts[0].to_string(),
            instrument: parts[1].to_string(),
            data_level,
            descriptor: parts[3].to_string(),
            start_date,
            end_date,
            version: parts[6].to_string(),
            extension: extension.to_string(),
        })
    }

    /// Parses the final component of an object-store key.
    pub fn from_path(path: &str) -> Result<Self, ParseError> {
        let name = path.rsplit('/').next().unwrap_or(path);
        Self::parse(name)
    }

    /// Canonical object-store key: `<mission>/<instrument>/<level>/<YYYY>/<MM>/<filename>`.
    pub fn storage_key(&self) -> String {
        format!(
            "{}/{}/{}/{:04}/{:02}/{}",
            self.mission,
            self.instrument,
            self.data_level,
            self.start_date.year(),
            self.start_date.month(),
            self
        )
    }
}

impl fmt::Display for ScienceFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}_{}_{}.{}",
            self.mission,
            self.instrument,
            self.data_level,
            self.descriptor,
            self.start_date.format(DATE_FORMAT),
            self.end_date.format(DATE_FORMAT),
            self.version,
            self.extension
        )
    }
}

/// Parses a `YYYYMMDD` token.
pub fn parse_date(token: &str) -> Result<NaiveDate, ParseError> {
    if token.len() != 8 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidDate(token.to_string()));
    }
    NaiveDate::parse_from_str(token, DATE_FORMAT)
        .map_err(|_| ParseError::InvalidDate(token.to_string()))
}

fn validate_version(token: &str) -> Result<(), ParseError> {
    let b = token.as_bytes();
    let ok = b.len() == 6
        && b[0] == b'v'
        && b[1].is_ascii_digit()
        && b[2].is_ascii_digit()
        && b[3] == b'-'
        && b[4].is_ascii_digit()
        && b[5].is_ascii_digit();
    if ok {
        Ok(())
    } else {
        Err(ParseError::InvalidVersion(token.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENSION_MSG: &str = "Invalid extension. Extension should be pkts for data level l0 and cdf for data level higher than l0";

    #[test]
    fn parses_raw_packet_file() {
        let f = ScienceFilename::parse("imap_hit_l0_sci-test_20240101_20240104_v02-01.pkts").unwrap();
        assert_eq!(f.mission, "imap");
        assert_eq!(f.instrument, "hit");
        assert_eq!(f.data_level, DataLevel::L0);
        assert_eq!(f.descriptor, "sci-test");
        assert_eq!(f.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(f.end_date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(f.version, "v02-01");
        assert_eq!(f.extension, "pkts");
    }

    #[test]
    fn parses_hyphenated_instrument() {
        let f = ScienceFilename::parse("imap_ultra-45_l1c_sci_20240101_20240101_v01-00.cdf").unwrap();
        assert_eq!(f.instrument, "ultra-45");
        assert_eq!(f.data_level, DataLevel::L1c);
    }

    #[test]
    fn display_reconstructs_filename() {
        for name in [
            "imap_hit_l0_sci-test_20240101_20240104_v02-01.pkts",
            "imap_swapi_l1_sci-1m_20230724_20230724_v02-01.cdf",
            "imap_glows_l3d_sci_20251231_20260101_v10-99.cdf",
        ] {
            let parsed = ScienceFilename::parse(name).unwrap();
            assert_eq!(parsed.to_string(), name);
            assert_eq!(ScienceFilename::parse(&parsed.to_string()).unwrap(), parsed);
        }
    }

    #[test]
    fn raw_level_only_accepts_packets() {
        let err = ScienceFilename::parse("imap_hit_l0_sci-test_20240101_20240104_v02-01.cdf").unwrap_err();
        assert!(matches!(err, ParseError::InvalidExtension { level: DataLevel::L0, .. }));
        assert_eq!(err.to_string(), EXTENSION_MSG);
    }

    #[test]
    fn processed_levels_only_accept_cdf() {
        for level in DataLevel::ALL.iter().filter(|l| !l.is_raw()) {
            let ok = format!("imap_hit_{}_sci_20240101_20240104_v02-01.cdf", level);
            assert!(ScienceFilename::parse(&ok).is_ok(), "{}", ok);

            for ext in ["pkts", "txt", "CDF"] {
                let bad = format!("imap_hit_{}_sci_20240101_20240104_v02-01.{}", level, ext);
                let err = ScienceFilename::parse(&bad).unwrap_err();
                assert_eq!(err.to_string(), EXTENSION_MSG, "{}", bad);
            }
        }
    }

    #[test]
    fn unknown_level_rejected() {
        let err = ScienceFilename::parse("imap_hit_l9_sci_20240101_20240104_v02-01.cdf").unwrap_err();
        assert_eq!(err, ParseError::InvalidDataLevel("l9".to_string()));
    }

    #[test]
    fn malformed_names_rejected() {
        assert!(matches!(
            ScienceFilename::parse("imap_hit_l0_sci_20240101_v02-01.pkts"),
            Err(ParseError::Malformed { .. })
        ));
        assert!(matches!(
            ScienceFilename::parse("imap_hit_l0_sci_20240101_20240104_v02-01"),
            Err(ParseError::Malformed { .. })
        ));
        assert!(matches!(
            ScienceFilename::parse("imap_hit_l0__20240101_20240104_v02-01.pkts"),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn bad_date_and_version_rejected() {
        assert_eq!(
            ScienceFilename::parse("imap_hit_l0_sci_20240231_20240301_v02-01.pkts").unwrap_err(),
            ParseError::InvalidDate("20240231".to_string())
        );
        assert_eq!(
            ScienceFilename::parse("imap_hit_l0_sci_20240101_20240104_v2-1.pkts").unwrap_err(),
            ParseError::InvalidVersion("v2-1".to_string())
        );
    }

    #[test]
    fn storage_key_uses_start_date() {
        let f = ScienceFilename::parse("imap_swapi_l1_sci-1m_20230724_20230725_v02-01.cdf").unwrap();
        assert_eq!(
            f.storage_key(),
            "imap/swapi/l1/2023/07/imap_swapi_l1_sci-1m_20230724_20230725_v02-01.cdf"
        );
    }

    #[test]
    fn from_path_uses_basename() {
        let f = ScienceFilename::from_path(
            "imap/hit/l0/2024/01/imap_hit_l0_sci-test_20240101_20240104_v02-01.pkts",
        )
        .unwrap();
        assert_eq!(f.instrument, "hit");
    }
}
