//! Class-file version numbers and the remap rules applied to them.
//!
//! A rule is any `Fn(VersionPair) -> VersionPair`. The helpers here build the
//! rules the CLI needs; callers are free to pass their own closures.

use serde::Serialize;

use crate::error::{PatchError, PatchResult};

/// Difference between a Java feature release and its class-file major version
/// (Java 8 => 52, Java 17 => 61).
pub const JAVA_RELEASE_OFFSET: u16 = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct VersionPair {
    pub major: u16,
    pub minor: u16,
}

impl VersionPair {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for VersionPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

pub fn identity() -> impl Fn(VersionPair) -> VersionPair + Copy {
    |version| version
}

/// Rewrites `from` to `to`; every other major and every minor is kept.
pub fn remap_major(from: u16, to: u16) -> impl Fn(VersionPair) -> VersionPair + Copy {
    remap(from, to, None)
}

/// Rewrites `from` to `to`, replacing the minor of rewritten classes when
/// `minor` is given.
pub fn remap(from: u16, to: u16, minor: Option<u16>) -> impl Fn(VersionPair) -> VersionPair + Copy {
    move |version| {
        if version.major == from {
            VersionPair::new(to, minor.unwrap_or(version.minor))
        } else {
            version
        }
    }
}

pub fn release_to_major(release: u16) -> PatchResult<u16> {
    release.checked_add(JAVA_RELEASE_OFFSET).ok_or_else(|| {
        PatchError::Argument(format!(
            "java release {release} does not map to a class-file major version"
        ))
    })
}
