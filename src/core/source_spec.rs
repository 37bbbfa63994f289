//! Where the sources of a module version come from.
//!
//! In the dependency database a source is stored as a single-key object
//! whose key is the source type:
//!
//! ```json
//! {"git": {"url": "ssh://host/repo", "tag": "R1-2"}}
//! {"path": "/opt/src/alarm"}
//! ```
//!
//! The `path` type is the odd one out: its value is the bare URL string.
//! Every other type uses an object, with empty strings left out on write.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::util::errors::{DbError, DbResult};

/// Kind of source a module version is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Path,
    Tar,
    Git,
    Svn,
    Cvs,
    Hg,
    Darcs,
}

impl SourceKind {
    pub const ALL: [SourceKind; 7] = [
        SourceKind::Path,
        SourceKind::Tar,
        SourceKind::Git,
        SourceKind::Svn,
        SourceKind::Cvs,
        SourceKind::Hg,
        SourceKind::Darcs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Path => "path",
            SourceKind::Tar => "tar",
            SourceKind::Git => "git",
            SourceKind::Svn => "svn",
            SourceKind::Cvs => "cvs",
            SourceKind::Hg => "hg",
            SourceKind::Darcs => "darcs",
        }
    }

    /// True for version control systems.
    pub fn is_repo(self) -> bool {
        !matches!(self, SourceKind::Path | SourceKind::Tar)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DbError::spec(format!("unknown source type '{}'", s)))
    }
}

/// A source coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredSource", into = "StoredSource")]
pub struct SourceSpec {
    pub kind: SourceKind,
    pub url: String,
    pub tag: Option<String>,
    pub rev: Option<String>,
    pub patches: Option<Vec<String>>,
    pub commands: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceFields {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    commands: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SourceBody {
    Url(String),
    Fields(SourceFields),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
struct StoredSource(BTreeMap<String, SourceBody>);

impl TryFrom<StoredSource> for SourceSpec {
    type Error = String;

    fn try_from(stored: StoredSource) -> Result<Self, Self::Error> {
        let mut entries = stored.0.into_iter();
        let (Some((kind, body)), None) = (entries.next(), entries.next()) else {
            return Err("source must have exactly one key".to_string());
        };
        let kind: SourceKind = kind.parse().map_err(|e: DbError| e.to_string())?;
        let fields = match body {
            SourceBody::Url(url) => SourceFields {
                url,
                ..Default::default()
            },
            SourceBody::Fields(fields) => fields,
        };
        if fields.url.is_empty() {
            return Err(format!("{} source without url", kind));
        }
        Ok(SourceSpec {
            kind,
            url: fields.url,
            tag: fields.tag,
            rev: fields.rev,
            patches: fields.patches,
            commands: fields.commands,
        })
    }
}

impl From<SourceSpec> for StoredSource {
    fn from(spec: SourceSpec) -> Self {
        let body = if spec.kind == SourceKind::Path {
            SourceBody::Url(spec.url)
        } else {
            let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());
            SourceBody::Fields(SourceFields {
                url: spec.url,
                tag: non_empty(spec.tag),
                rev: non_empty(spec.rev),
                patches: spec.patches,
                commands: spec.commands,
            })
        };
        let mut map = BTreeMap::new();
        map.insert(spec.kind.as_str().to_string(), body);
        StoredSource(map)
    }
}

impl SourceSpec {
    pub fn new(kind: SourceKind, url: impl Into<String>) -> Self {
        SourceSpec {
            kind,
            url: url.into(),
            tag: None,
            rev: None,
            patches: None,
            commands: None,
        }
    }

    pub fn path(url: impl Into<String>) -> Self {
        Self::new(SourceKind::Path, url)
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// The persisted JSON value.
    pub fn to_deps_value(&self) -> serde_json::Value {
        serde_json::to_value(StoredSource::from(self.clone())).unwrap_or(serde_json::Value::Null)
    }

    /// Read a persisted JSON value.
    pub fn from_deps_value(value: &serde_json::Value) -> DbResult<Self> {
        SourceSpec::deserialize(value).map_err(|e| DbError::Invalid {
            kind: "source",
            message: e.to_string(),
            origin: String::new(),
        })
    }

    /// Parse a source given on the command line.
    ///
    /// Accepts the definition form `type=git url=URL tag=T patches=a,b`
    /// (values may be JSON strings) and the short form `git URL`.
    pub fn parse(text: &str) -> DbResult<Self> {
        let invalid = || DbError::spec(format!("invalid source spec {:?}", text));
        if text.trim().is_empty() {
            return Err(invalid());
        }
        if !text.contains('=') {
            let mut words = text.split_whitespace();
            let (Some(kind), Some(url), None) = (words.next(), words.next(), words.next()) else {
                return Err(invalid());
            };
            return Ok(SourceSpec::new(kind.parse().map_err(|_| invalid())?, url));
        }

        let defs = parse_definitions(text)?;
        let mut kind = None;
        let mut spec = SourceSpec::new(SourceKind::Path, "");
        for (name, mut values) in defs {
            let single = |values: &mut Vec<String>| -> DbResult<String> {
                if values.len() != 1 {
                    return Err(DbError::spec(format!(
                        "{} takes exactly one value in source spec {:?}",
                        name, text
                    )));
                }
                Ok(values.remove(0))
            };
            match name.as_str() {
                "type" => kind = Some(single(&mut values)?.parse::<SourceKind>()?),
                "url" => spec.url = single(&mut values)?,
                "tag" => spec.tag = Some(single(&mut values)?),
                "rev" => spec.rev = Some(single(&mut values)?),
                "patches" => spec.patches = Some(values),
                "commands" => spec.commands = Some(values),
                _ => {
                    return Err(DbError::spec(format!(
                        "invalid names found in source spec {:?}",
                        text
                    )))
                }
            }
        }
        spec.kind = kind.ok_or_else(|| DbError::spec(format!("no source type in {:?}", text)))?;
        if spec.url.is_empty() {
            return Err(DbError::spec(format!("no url in source spec {:?}", text)));
        }
        Ok(spec)
    }

    /// Take over the values of `other`.
    ///
    /// A different kind replaces everything. Otherwise each field set in
    /// `other` overwrites ours, and an empty tag or rev removes ours.
    /// Returns whether anything changed.
    pub fn change_source(&mut self, other: &SourceSpec) -> bool {
        if self.kind != other.kind {
            *self = other.clone();
            self.tag = self.tag.take().filter(|t| !t.is_empty());
            self.rev = self.rev.take().filter(|r| !r.is_empty());
            return true;
        }
        let before = self.clone();
        if !other.url.is_empty() {
            self.url = other.url.clone();
        }
        for (mine, theirs) in [(&mut self.tag, &other.tag), (&mut self.rev, &other.rev)] {
            match theirs.as_deref() {
                Some("") => *mine = None,
                Some(v) => *mine = Some(v.to_string()),
                None => {}
            }
        }
        if other.patches.is_some() {
            self.patches = other.patches.clone();
        }
        if other.commands.is_some() {
            self.commands = other.commands.clone();
        }
        *self != before
    }

    /// Point a repository source at another tag.
    pub fn change_source_by_tag(&mut self, tag: &str) -> DbResult<bool> {
        if !self.kind.is_repo() {
            return Err(DbError::spec(format!(
                "you cannot provide just a new tag for a source specification of type '{}'",
                self.kind
            )));
        }
        if self.tag.as_deref() == Some(tag) {
            return Ok(false);
        }
        self.tag = Some(tag.to_string());
        Ok(true)
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type={} url={}", self.kind, self.url)?;
        if let Some(tag) = &self.tag {
            write!(f, " tag={}", tag)?;
        }
        if let Some(rev) = &self.rev {
            write!(f, " rev={}", rev)?;
        }
        if let Some(patches) = &self.patches {
            write!(f, " patches={}", patches.join(","))?;
        }
        Ok(())
    }
}

/// Split `NAME=VALUE[,VALUE..] NAME=..` into name/value lists.
fn parse_definitions(text: &str) -> DbResult<Vec<(String, Vec<String>)>> {
    let chars: Vec<char> = text.chars().collect();
    let err = |pos: usize| DbError::spec(format!("parse error in definition {:?} pos {}", text, pos));
    let skip_ws = |mut i: usize| {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        i
    };

    let mut defs = Vec::new();
    let mut i = skip_ws(0);
    while i < chars.len() {
        let start = i;
        while i < chars.len() && chars[i] != '=' && !chars[i].is_whitespace() {
            i += 1;
        }
        let name: String = chars[start..i].iter().collect();
        i = skip_ws(i);
        if name.is_empty() || i >= chars.len() || chars[i] != '=' {
            return Err(err(i));
        }
        i = skip_ws(i + 1);

        let mut values = Vec::new();
        loop {
            if i >= chars.len() {
                return Err(err(i));
            }
            let value = if chars[i] == '"' {
                let open = i;
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(err(open));
                }
                i += 1;
                let quoted: String = chars[open..i].iter().collect();
                serde_json::from_str::<String>(&quoted).map_err(|_| err(open))?
            } else {
                let begin = i;
                while i < chars.len() && chars[i] != ',' && !chars[i].is_whitespace() {
                    i += 1;
                }
                if begin == i {
                    return Err(err(i));
                }
                chars[begin..i].iter().collect()
            };
            values.push(value);
            let after = skip_ws(i);
            if after < chars.len() && chars[after] == ',' {
                i = skip_ws(after + 1);
                continue;
            }
            i = after;
            break;
        }
        defs.push((name, values));
    }
    Ok(defs)
}
