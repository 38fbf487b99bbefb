//! Slug parsing and validation.
//!
//! A slug reference has the form `<base>[@<version>]`. A missing version is
//! equivalent to `@latest`. Each `(slug, version)` tuple is unique in the
//! store.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::CoreError;
use crate::version::Version;

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").expect("slug pattern is valid"))
}

/// Validate a bare slug (no version suffix).
pub fn validate_slug(slug: &str) -> Result<(), CoreError> {
    if slug_pattern().is_match(slug) {
        Ok(())
    } else {
        Err(CoreError::invalid_slug(slug))
    }
}

/// A parsed `<base>[@<version>]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugRef {
    pub base: String,
    pub version: Version,
}

impl SlugRef {
    pub fn new(base: impl Into<String>, version: Version) -> Result<Self, CoreError> {
        let base = base.into();
        validate_slug(&base)?;
        Ok(Self { base, version })
    }
}

impl FromStr for SlugRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((base, version)) => Self::new(base, version.parse()?),
            None => Self::new(s, Version::latest()),
        }
    }
}

impl fmt::Display for SlugRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.base, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_version_means_latest() {
        let r: SlugRef = "user-admin".parse().unwrap();
        assert_eq!(r.base, "user-admin");
        assert!(r.version.latest);
    }

    #[test]
    fn parses_versioned_slug() {
        let r: SlugRef = "role-user-community@1.0.0".parse().unwrap();
        assert_eq!(r.base, "role-user-community");
        assert_eq!(r.version, Version::new(1, 0, 0));
    }

    #[test]
    fn rejects_invalid_slugs() {
        assert!("Has Spaces".parse::<SlugRef>().is_err());
        assert!("UPPER".parse::<SlugRef>().is_err());
        assert!("under_score".parse::<SlugRef>().is_err());
        assert!("ok-slug@bogus.version.x".parse::<SlugRef>().is_err());
    }
}
