//! Adapter registry: dispatch by source kind.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::core::source_spec::{SourceKind, SourceSpec};
use crate::sources::adapter::{RepoHandle, RepositoryAdapter, ScanHints};
use crate::sources::path::PathAdapter;
use crate::util::errors::{DbError, DbResult};

/// Order in which version control systems are probed.
pub const REPO_PROBE_ORDER: [SourceKind; 5] = [
    SourceKind::Darcs,
    SourceKind::Hg,
    SourceKind::Git,
    SourceKind::Svn,
    SourceKind::Cvs,
];

/// Order in which non-repository sources are probed, after repositories.
pub const SOURCE_PROBE_ORDER: [SourceKind; 2] = [SourceKind::Tar, SourceKind::Path];

/// The set of available source backends.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<SourceKind, Box<dyn RepositoryAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in backend.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PathAdapter));
        registry
    }

    /// Add or replace the adapter for its kind.
    pub fn register(&mut self, adapter: Box<dyn RepositoryAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Kinds with a registered adapter.
    pub fn kinds(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.adapters.keys().copied()
    }

    /// The adapter for `kind`.
    pub fn get(&self, kind: SourceKind) -> DbResult<&dyn RepositoryAdapter> {
        self.adapters
            .get(&kind)
            .map(|a| a.as_ref())
            .ok_or_else(|| {
                DbError::not_found(format!("no adapter registered for '{}'", kind.as_str()))
            })
    }

    fn probe(
        &self,
        kinds: &[SourceKind],
        dir: &Path,
        hints: &ScanHints,
    ) -> DbResult<Option<Box<dyn RepoHandle>>> {
        for kind in kinds {
            let Some(adapter) = self.adapters.get(kind) else {
                continue;
            };
            if let Some(handle) = adapter.scan_directory(dir, hints)? {
                debug!("{} recognized as {}", dir.display(), kind.as_str());
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// Find a version control working copy at `dir`.
    pub fn scan_repository(
        &self,
        dir: &Path,
        hints: &ScanHints,
    ) -> DbResult<Option<Box<dyn RepoHandle>>> {
        self.probe(&REPO_PROBE_ORDER, dir, hints)
    }

    /// Describe `dir` as a source of any kind.
    ///
    /// Repositories are preferred unless `hints.force_local` is set, in
    /// which case only the `path` backend is consulted.
    pub fn scan_source(
        &self,
        dir: &Path,
        hints: &ScanHints,
    ) -> DbResult<Option<Box<dyn RepoHandle>>> {
        if hints.force_local {
            return self.probe(&[SourceKind::Path], dir, hints);
        }
        if let Some(handle) = self.scan_repository(dir, hints)? {
            return Ok(Some(handle));
        }
        self.probe(&SOURCE_PROBE_ORDER, dir, hints)
    }

    /// Check out `source` into `dest` with the matching backend.
    pub fn checkout(&self, source: &SourceSpec, dest: &Path) -> DbResult<()> {
        self.get(source.kind)?.checkout(source, dest)
    }
}
