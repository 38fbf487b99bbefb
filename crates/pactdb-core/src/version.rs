//! Contract version grammar and ordering.
//!
//! Versions follow `major[.minor[.patch]][-prerelease][+build]`, or the
//! literal `latest`. A missing version on a slug means `latest`. The version
//! tuple is stored decomposed into five columns (`version_major`,
//! `version_minor`, `version_patch`, `version_prerelease`, `version_build`);
//! an empty prerelease marks a release build.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A parsed contract version.
///
/// `latest` parses to `0.0.0` with the `latest` flag set; it is never stored,
/// only used to address the highest version of a slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
    /// Empty string means a release build.
    pub prerelease: String,
    pub build: String,
    /// True when the version was given as the literal `latest`.
    pub latest: bool,
}

impl Version {
    pub fn new(major: i32, minor: i32, patch: i32) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: String::new(),
            build: String::new(),
            latest: false,
        }
    }

    /// The `latest` marker version.
    pub fn latest() -> Self {
        Self {
            major: 0,
            minor: 0,
            patch: 0,
            prerelease: String::new(),
            build: String::new(),
            latest: true,
        }
    }

    pub fn with_prerelease(mut self, prerelease: impl Into<String>) -> Self {
        self.prerelease = prerelease.into();
        self
    }

    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = build.into();
        self
    }

    /// True for release builds (no prerelease component).
    pub fn is_release(&self) -> bool {
        self.prerelease.is_empty()
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::latest()
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "latest" {
            return Ok(Self::latest());
        }

        let (rest, build) = match s.split_once('+') {
            Some((rest, build)) if !build.is_empty() => (rest, build.to_string()),
            Some(_) => return Err(CoreError::invalid_version(s)),
            None => (s, String::new()),
        };
        let (numbers, prerelease) = match rest.split_once('-') {
            Some((numbers, pre)) if !pre.is_empty() => (numbers, pre.to_string()),
            Some(_) => return Err(CoreError::invalid_version(s)),
            None => (rest, String::new()),
        };

        let mut parts = numbers.split('.');
        let major = parse_component(parts.next(), s)?;
        let minor = match parts.next() {
            Some(p) => parse_component(Some(p), s)?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => parse_component(Some(p), s)?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(CoreError::invalid_version(s));
        }

        Ok(Self {
            major,
            minor,
            patch,
            prerelease,
            build,
            latest: false,
        })
    }
}

fn parse_component(part: Option<&str>, original: &str) -> Result<i32, CoreError> {
    let part = part.filter(|p| !p.is_empty()).ok_or_else(|| CoreError::invalid_version(original))?;
    if !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::invalid_version(original));
    }
    part.parse().map_err(|_| CoreError::invalid_version(original))
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.latest {
            return write!(f, "latest");
        }
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

impl Ord for Version {
    /// Releases sort above prereleases for equal numbers: the key is
    /// `(prerelease, major, minor, patch, build)`, where the empty
    /// prerelease of a release sorts first. This mirrors the five composite
    /// sort keys the query compiler emits for `sortBy: "version"`.
    fn cmp(&self, other: &Self) -> Ordering {
        (
            &self.prerelease,
            self.major,
            self.minor,
            self.patch,
            &self.build,
        )
            .cmp(&(
                &other.prerelease,
                other.major,
                other.minor,
                other.patch,
                &other.build,
            ))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_version() {
        let v: Version = "1.2.3-beta+456".parse().unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 2);
        assert_eq!(v.patch, 3);
        assert_eq!(v.prerelease, "beta");
        assert_eq!(v.build, "456");
        assert!(!v.latest);
        assert!(!v.is_release());
    }

    #[test]
    fn parses_partial_versions() {
        let v: Version = "2".parse().unwrap();
        assert_eq!((v.major, v.minor, v.patch), (2, 0, 0));

        let v: Version = "2.1".parse().unwrap();
        assert_eq!((v.major, v.minor, v.patch), (2, 1, 0));
    }

    #[test]
    fn parses_latest() {
        let v: Version = "latest".parse().unwrap();
        assert!(v.latest);
        assert_eq!((v.major, v.minor, v.patch), (0, 0, 0));
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["1.x.0", "1.0.0.0", "", "1.0.0-", "1.0.0+", "v1.0.0"] {
            assert!(bad.parse::<Version>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn display_round_trips() {
        for s in ["1.0.0", "1.2.3-beta", "1.2.3-beta+001", "latest"] {
            let v: Version = s.parse().unwrap();
            assert_eq!(v.to_string(), s);
        }
    }

    #[test]
    fn releases_sort_above_prereleases() {
        let mut versions: Vec<Version> = [
            "1.0.0-beta",
            "1.0.0",
            "1.0.0-alpha+001",
            "1.0.0-beta+001",
            "1.0.1",
            "1.1.0",
        ]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
        versions.sort();
        let sorted: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(
            sorted,
            vec![
                "1.0.0",
                "1.0.1",
                "1.1.0",
                "1.0.0-alpha+001",
                "1.0.0-beta",
                "1.0.0-beta+001",
            ]
        );
    }
}
