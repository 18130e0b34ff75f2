//! Host version string parsing
//!
//! Host builds identify themselves with a `major.minor` release line,
//! optionally suffixed with `-ea` for early access builds
//! (e.g. `5.3`, `5.4-ea`). Anything else fails to parse; compatibility
//! decisions treat unparseable versions as incompatible.

use plugget_errors::VersionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed host build identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVersion {
    pub major: u32,
    pub minor: u32,
    pub early_access: bool,
}

impl HostVersion {
    #[must_use]
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            early_access: false,
        }
    }

    #[must_use]
    pub fn early_access(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            early_access: true,
        }
    }

    /// Ordering key for range membership. The early access marker does
    /// not participate in ordering; it is a separate carve-out.
    #[must_use]
    pub fn key(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

/// Parse one version component, rejecting anything that does not
/// round-trip (signs, leading zeros, embedded whitespace).
fn parse_component(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

impl FromStr for HostVersion {
    type Err = VersionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fail = || VersionError::UnknownVersion {
            input: input.to_string(),
        };

        let (version, early_access) = match input.strip_suffix("-ea") {
            Some(rest) => (rest, true),
            None => (input, false),
        };

        let (major, minor) = version.split_once('.').ok_or_else(fail)?;
        let major = parse_component(major).ok_or_else(fail)?;
        let minor = parse_component(minor).ok_or_else(fail)?;

        Ok(Self {
            major,
            minor,
            early_access,
        })
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.early_access {
            write!(f, "{}.{}-ea", self.major, self.minor)
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}
