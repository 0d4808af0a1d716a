use crate::error::VersionFormatError;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

// =============================================================================
// Version Normalization and Ordering
// =============================================================================

static DOTTED_QUAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)\.(\d+)").expect("dotted-quad pattern is valid")
});

/// A dotted-quad release number. Field order gives the comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionToken {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: u64,
}

impl VersionToken {
    pub const fn new(major: u64, minor: u64, patch: u64, build: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

/// Extract the leading `N.N.N.N` from a raw version string.
///
/// Plex versions carry a build hash suffix (`1.32.5.7395-abcdef12`); anything
/// after the fourth number is dropped rather than rejected. Each component
/// must fit in a `u64`; larger numbers are reported as an invalid format.
pub fn normalize(raw: &str) -> Result<VersionToken, VersionFormatError> {
    let invalid = || VersionFormatError {
        raw: raw.to_string(),
    };

    let caps = DOTTED_QUAD.captures(raw).ok_or_else(invalid)?;
    let component = |i: usize| -> Result<u64, VersionFormatError> {
        caps[i].parse::<u64>().map_err(|_| invalid())
    };

    Ok(VersionToken::new(
        component(1)?,
        component(2)?,
        component(3)?,
        component(4)?,
    ))
}

pub fn compare(a: &VersionToken, b: &VersionToken) -> Ordering {
    a.cmp(b)
}
