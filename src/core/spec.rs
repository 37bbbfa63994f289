//! Module version specifications.
//!
//! A spec names a module and optionally constrains its version:
//!
//! | text           | meaning                   |
//! |----------------|---------------------------|
//! | `ALARM`        | any version               |
//! | `ALARM:R3-7`   | exactly `R3-7`            |
//! | `ALARM:+R3-7`  | `R3-7` or newer           |
//! | `ALARM:-R3-7`  | `R3-7` or older           |

use std::fmt;
use std::str::FromStr;

use crate::core::version::rev2key;
use crate::util::errors::{DbError, DbResult};

/// How a spec's version constrains candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionFlag {
    Eq,
    /// At least this version.
    Ge,
    /// At most this version.
    Le,
}

impl VersionFlag {
    fn prefix(self) -> &'static str {
        match self {
            VersionFlag::Eq => "",
            VersionFlag::Ge => "+",
            VersionFlag::Le => "-",
        }
    }
}

/// One `MODULE[:[+-]VERSION]` request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSpec {
    module: String,
    version: Option<String>,
    flag: Option<VersionFlag>,
}

impl VersionSpec {
    pub fn new(module: impl Into<String>, version: Option<String>, flag: Option<VersionFlag>) -> Self {
        VersionSpec {
            module: module.into(),
            version,
            flag,
        }
    }

    /// An exact `module:version` spec.
    pub fn exact(module: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(module, Some(version.into()), Some(VersionFlag::Eq))
    }

    /// A spec that accepts every version of `module`.
    pub fn any(module: impl Into<String>) -> Self {
        Self::new(module, None, None)
    }

    /// Parse a spec string.
    pub fn parse(text: &str) -> DbResult<Self> {
        let mut parts = text.split(':');
        let module = parts.next().unwrap_or_default();
        if module.is_empty() {
            return Err(DbError::spec(format!("module name missing in spec '{}'", text)));
        }
        let version_part = parts.next();
        if parts.next().is_some() {
            return Err(DbError::spec(format!("unexpected spec: {}", text)));
        }

        let (version, flag) = match version_part {
            None | Some("") => (None, None),
            Some(v) => {
                let (flag, name) = if let Some(rest) = v.strip_prefix('+') {
                    (VersionFlag::Ge, rest)
                } else if let Some(rest) = v.strip_prefix('-') {
                    (VersionFlag::Le, rest)
                } else {
                    (VersionFlag::Eq, v)
                };
                if name.is_empty() {
                    return Err(DbError::spec(format!("version missing in spec '{}'", text)));
                }
                (Some(name.to_string()), Some(flag))
            }
        };
        Ok(VersionSpec {
            module: module.to_string(),
            version,
            flag,
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn flag(&self) -> Option<VersionFlag> {
        self.flag
    }

    /// True if the spec does not constrain the version.
    pub fn no_version_spec(&self) -> bool {
        self.version.as_deref().is_none_or(str::is_empty)
    }

    pub fn is_exact(&self) -> bool {
        !self.no_version_spec() && self.flag == Some(VersionFlag::Eq)
    }

    pub fn assert_exact(&self) -> DbResult<()> {
        if self.is_exact() {
            return Ok(());
        }
        Err(DbError::spec(format!(
            "error at specification '{}', module specification must be exact",
            self
        )))
    }

    /// True only for an exact spec naming exactly `version`.
    pub fn equal(&self, version: &str) -> bool {
        self.flag == Some(VersionFlag::Eq) && self.version.as_deref() == Some(version)
    }

    /// Does `candidate` satisfy this spec?
    pub fn matches(&self, candidate: &str) -> bool {
        if self.no_version_spec() {
            return true;
        }
        compare_versions(self.version.as_deref(), Some(candidate), self.flag)
    }
}

/// Test `candidate` against `reference` under `flag`.
///
/// A missing version on either side always matches.
pub fn compare_versions(reference: Option<&str>, candidate: Option<&str>, flag: Option<VersionFlag>) -> bool {
    let (Some(reference), Some(candidate)) = (reference, candidate) else {
        return true;
    };
    match flag.unwrap_or(VersionFlag::Eq) {
        VersionFlag::Eq => reference == candidate,
        VersionFlag::Ge => rev2key(Some(candidate)) >= rev2key(Some(reference)),
        VersionFlag::Le => rev2key(Some(candidate)) <= rev2key(Some(reference)),
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.module)?;
        match (&self.version, self.flag) {
            (Some(v), flag) if !v.is_empty() => {
                let prefix = flag.map(VersionFlag::prefix).unwrap_or("");
                write!(f, ":{}{}", prefix, v)
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionSpec::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let s = VersionSpec::parse("ALARM").unwrap();
        assert_eq!(s.module(), "ALARM");
        assert_eq!(s.version(), None);
        assert_eq!(s.flag(), None);

        let s = VersionSpec::parse("ALARM:R3-2").unwrap();
        assert_eq!(s.version(), Some("R3-2"));
        assert_eq!(s.flag(), Some(VersionFlag::Eq));

        assert_eq!(
            VersionSpec::parse("ALARM:+R3-2").unwrap().flag(),
            Some(VersionFlag::Ge)
        );
        assert_eq!(
            VersionSpec::parse("ALARM:-R3-2").unwrap().flag(),
            Some(VersionFlag::Le)
        );
        assert!(VersionSpec::parse("ALARM:").unwrap().no_version_spec());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(VersionSpec::parse("A:R1:x"), Err(DbError::Spec(_))));
        assert!(matches!(VersionSpec::parse(":R1"), Err(DbError::Spec(_))));
        assert!(matches!(VersionSpec::parse("A:+"), Err(DbError::Spec(_))));
    }

    #[test]
    fn test_display_roundtrips() {
        for text in ["ALARM", "ALARM:R3-2", "ALARM:+R3-2", "ALARM:-R3-2"] {
            assert_eq!(VersionSpec::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_ge_matching() {
        let spec = VersionSpec::new("M", Some("R2".into()), Some(VersionFlag::Ge));
        assert!(!spec.matches("R1"));
        assert!(spec.matches("R2"));
        assert!(spec.matches("R3"));
    }

    #[test]
    fn test_le_matching() {
        let spec = VersionSpec::new("M", Some("R2".into()), Some(VersionFlag::Le));
        assert!(spec.matches("R1"));
        assert!(spec.matches("R2"));
        assert!(!spec.matches("R3"));
    }

    #[test]
    fn test_eq_matching_is_raw_string() {
        let spec = VersionSpec::exact("M", "R2");
        assert!(spec.matches("R2"));
        assert!(!spec.matches("2"));
        assert!(!spec.matches("R3"));
        assert!(VersionSpec::any("M").matches("anything"));
    }

    #[test]
    fn test_exactness() {
        assert!(VersionSpec::exact("M", "R1").is_exact());
        assert!(VersionSpec::exact("M", "R1").assert_exact().is_ok());
        assert!(!VersionSpec::any("M").is_exact());
        let ge = VersionSpec::parse("M:+R1").unwrap();
        assert!(!ge.is_exact());
        assert!(matches!(ge.assert_exact(), Err(DbError::Spec(_))));
        assert!(!ge.equal("R1"));
        assert!(VersionSpec::exact("M", "R1").equal("R1"));
    }

    #[test]
    fn test_compare_versions_with_missing_side() {
        assert!(compare_versions(None, Some("R1"), Some(VersionFlag::Eq)));
        assert!(compare_versions(Some("R1"), None, Some(VersionFlag::Ge)));
    }
}
