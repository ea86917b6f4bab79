//! OpenAPI version identification.
//!
//! Validation rules differ between OpenAPI 2.0 (Swagger) and the 3.x line.
//! The walk context carries the version being enforced so that validator
//! callbacks can gate version-specific behavior.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The OpenAPI specification version a definition is enforced against.
///
/// # Examples
/// ```
/// use oas_enforcer::Version;
///
/// let version: Version = "3.0.3".parse().unwrap();
/// assert_eq!(version.major, 3);
/// assert!(version.is_v3());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// OpenAPI 2.0, historically known as Swagger.
    pub const V2_0: Version = Version::new(2, 0, 0);
    /// The most common 3.0 line release.
    pub const V3_0_3: Version = Version::new(3, 0, 3);

    /// Creates a version from its three components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// True for the 2.x (Swagger) line.
    pub fn is_v2(&self) -> bool {
        self.major == 2
    }

    /// True for the 3.x line.
    pub fn is_v3(&self) -> bool {
        self.major == 3
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error returned when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionParseError {
    input: String,
}

impl Display for VersionParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Invalid version string: {}", self.input)
    }
}

impl std::error::Error for VersionParseError {}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError {
            input: s.to_string(),
        };
        let mut parts = s.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(err)?;
        let minor = parts
            .next()
            .map(|p| p.parse().map_err(|_| err()))
            .transpose()?
            .unwrap_or(0);
        let patch = parts
            .next()
            .map(|p| p.parse().map_err(|_| err()))
            .transpose()?
            .unwrap_or(0);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Version::new(major, minor, patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_version() {
        let version: Version = "3.0.3".parse().unwrap();
        assert_eq!(version, Version::V3_0_3);
    }

    #[test]
    fn parse_short_version() {
        let version: Version = "2.0".parse().unwrap();
        assert_eq!(version, Version::V2_0);
        let version: Version = "3".parse().unwrap();
        assert_eq!(version, Version::new(3, 0, 0));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Version>().is_err());
        assert!("three".parse::<Version>().is_err());
        assert!("3.0.3.1".parse::<Version>().is_err());
    }

    #[test]
    fn version_gates() {
        assert!(Version::V2_0.is_v2());
        assert!(!Version::V2_0.is_v3());
        assert!(Version::V3_0_3.is_v3());
    }

    #[test]
    fn display_round_trip() {
        let version = Version::new(3, 1, 0);
        let parsed: Version = version.to_string().parse().unwrap();
        assert_eq!(version, parsed);
    }
}
