//! Version ordering keys.
//!
//! Module versions are free-form tags such as `R3-7`, `2.1.0` or `head`.
//! They are never compared as raw strings. Instead every tag is mapped to a
//! key whose lexicographic order is the version order:
//!
//! - a leading alphabetic prefix (and one `-`/`_` after it) is dropped when
//!   digits follow, so `R3-7`, `seq-3-7` and `3-7` compare equal,
//! - `-` and `.` both separate components, numeric components are zero
//!   padded to three digits (`R3-7` becomes `003.007`),
//! - tags without a numeric tail get a `-` prefix and therefore sort below
//!   every numeric version,
//! - the empty tag maps to `-`, the smallest key of all.

use std::cmp::Ordering;
use std::fmt;

/// Strip a leading alphabetic prefix from a tag if a number follows it.
///
/// ```
/// use drydock::core::version::tag2version;
/// assert_eq!(tag2version("R1-2"), "1-2");
/// assert_eq!(tag2version("R-1-2"), "1-2");
/// assert_eq!(tag2version("head"), "head");
/// ```
pub fn tag2version(tag: &str) -> &str {
    let mut rest = tag.trim_start_matches(|c: char| c.is_alphabetic());
    if let Some(stripped) = rest.strip_prefix(['-', '_']) {
        rest = stripped;
    }
    match rest.chars().next() {
        Some(c) if c.is_ascii_digit() => rest,
        _ => tag,
    }
}

/// Comparable key of a version tag.
///
/// `None` and the empty string share the global minimum key.
pub fn rev2key(rev: Option<&str>) -> String {
    let rev = rev.unwrap_or("");
    if rev.is_empty() {
        return "-".to_string();
    }
    let version = tag2version(rev);
    if !version.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("-{}", rev);
    }
    version
        .split(['-', '.'])
        .map(|part| match part.parse::<u64>() {
            Ok(n) => format!("{:03}", n),
            Err(_) => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// A version tag together with its ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionKey {
    key: String,
}

impl VersionKey {
    pub fn new(rev: &str) -> Self {
        VersionKey {
            key: rev2key(Some(rev)),
        }
    }

    /// Key of "no version", lower than all others.
    pub fn lowest() -> Self {
        VersionKey {
            key: rev2key(None),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Compare two version tags by key.
pub fn compare_tags(a: &str, b: &str) -> Ordering {
    rev2key(Some(a)).cmp(&rev2key(Some(b)))
}
