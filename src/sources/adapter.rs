//! Repository adapter interface.
//!
//! An adapter knows one kind of source (a version control system, a tar
//! file, a plain directory). It can recognize a working copy of that kind
//! and produce a checkout from a [`SourceSpec`].

use std::fmt;
use std::path::Path;

use regex::Regex;

use crate::core::source_spec::{SourceKind, SourceSpec};
use crate::util::errors::DbResult;

/// Rewrites applied to directories and URLs found while scanning.
#[derive(Debug, Clone, Default)]
pub struct ScanHints {
    /// `(pattern, replacement)` applied to the scanned directory.
    pub dir_patcher: Option<(Regex, String)>,
    /// `(pattern, replacement)` applied to the remote URL of a repository.
    pub url_patcher: Option<(Regex, String)>,
    /// Report plain `path` sources even for repository working copies.
    pub force_local: bool,
}

impl ScanHints {
    /// Apply the directory rewrite, if any.
    pub fn patch_dir(&self, dir: &str) -> String {
        match &self.dir_patcher {
            Some((re, rep)) => re.replace_all(dir, rep.as_str()).into_owned(),
            None => dir.to_string(),
        }
    }

    /// Apply the URL rewrite, if any.
    pub fn patch_url(&self, url: &str) -> String {
        match &self.url_patcher {
            Some((re, rep)) => re.replace_all(url, rep.as_str()).into_owned(),
            None => url.to_string(),
        }
    }
}

/// A working copy found by an adapter.
pub trait RepoHandle: fmt::Debug {
    /// The kind of source this handle represents.
    fn kind(&self) -> SourceKind;

    /// Whether the backend is a distributed version control system.
    fn is_distributed(&self) -> bool;

    /// The root of the working copy.
    fn directory(&self) -> &Path;

    /// Describe the working copy as a source specification.
    ///
    /// Fails when the working copy has uncommitted changes.
    fn source_spec(&self) -> DbResult<SourceSpec>;

    /// Commit all local changes with `message`.
    fn commit(&mut self, message: &str) -> DbResult<()>;

    /// Push committed changes to the remote.
    fn push(&mut self) -> DbResult<()>;

    /// Pull from the remote and merge into the working copy.
    fn pull_and_merge(&mut self) -> DbResult<()>;

    /// Update a centralized working copy.
    fn update(&mut self) -> DbResult<()>;
}

/// One kind of source backend.
pub trait RepositoryAdapter: fmt::Debug {
    /// The kind this adapter handles.
    fn kind(&self) -> SourceKind;

    /// Whether the backend is a distributed version control system.
    fn is_distributed(&self) -> bool;

    /// Return a handle when `dir` is a working copy of this kind.
    fn scan_directory(
        &self,
        dir: &Path,
        hints: &ScanHints,
    ) -> DbResult<Option<Box<dyn RepoHandle>>>;

    /// Create a working copy of `source` at `dest`.
    fn checkout(&self, source: &SourceSpec, dest: &Path) -> DbResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patchers() {
        let hints = ScanHints {
            dir_patcher: Some((Regex::new("^/home/[^/]+").unwrap(), "/srv".into())),
            url_patcher: Some((Regex::new("^ssh://host").unwrap(), "https://host".into())),
            ..ScanHints::default()
        };
        assert_eq!(hints.patch_dir("/home/alice/mod"), "/srv/mod");
        assert_eq!(hints.patch_url("ssh://host/repo"), "https://host/repo");
        assert_eq!(ScanHints::default().patch_dir("/a"), "/a");
    }
}
