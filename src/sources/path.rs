//! Path backend: plain directories.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::source_spec::{SourceKind, SourceSpec};
use crate::sources::adapter::{RepoHandle, RepositoryAdapter, ScanHints};
use crate::util::errors::{DbError, DbResult};
use crate::util::fs::copy_dir_all;

/// Adapter for sources that are a directory on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathAdapter;

/// A directory found by [`PathAdapter`].
#[derive(Debug)]
pub struct PathHandle {
    dir: PathBuf,
    url: String,
}

fn not_a_repository(dir: &Path) -> DbError {
    DbError::spec(format!(
        "'{}' is a plain directory, not a repository",
        dir.display()
    ))
}

impl RepoHandle for PathHandle {
    fn kind(&self) -> SourceKind {
        SourceKind::Path
    }

    fn is_distributed(&self) -> bool {
        false
    }

    fn directory(&self) -> &Path {
        &self.dir
    }

    fn source_spec(&self) -> DbResult<SourceSpec> {
        Ok(SourceSpec::path(self.url.clone()))
    }

    fn commit(&mut self, _message: &str) -> DbResult<()> {
        Err(not_a_repository(&self.dir))
    }

    fn push(&mut self) -> DbResult<()> {
        Err(not_a_repository(&self.dir))
    }

    fn pull_and_merge(&mut self) -> DbResult<()> {
        Err(not_a_repository(&self.dir))
    }

    fn update(&mut self) -> DbResult<()> {
        Err(not_a_repository(&self.dir))
    }
}

impl RepositoryAdapter for PathAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Path
    }

    fn is_distributed(&self) -> bool {
        false
    }

    fn scan_directory(
        &self,
        dir: &Path,
        hints: &ScanHints,
    ) -> DbResult<Option<Box<dyn RepoHandle>>> {
        if !dir.is_dir() {
            return Ok(None);
        }
        let abs = dir
            .canonicalize()
            .map_err(|e| DbError::io("resolve", dir, e))?;
        let url = hints.patch_dir(&abs.to_string_lossy());
        Ok(Some(Box::new(PathHandle { dir: abs, url })))
    }

    fn checkout(&self, source: &SourceSpec, dest: &Path) -> DbResult<()> {
        if source.kind != SourceKind::Path {
            return Err(DbError::spec(format!(
                "path backend cannot check out a '{}' source",
                source.kind.as_str()
            )));
        }
        let src = Path::new(&source.url);
        if !src.is_dir() {
            return Err(DbError::not_found(format!(
                "source directory '{}' does not exist",
                source.url
            )));
        }
        debug!("copying {} to {}", src.display(), dest.display());
        copy_dir_all(src, dest)
    }
}
