//! A database directory kept under version control.
//!
//! Reading may first pull from the remote, writing may commit and push,
//! depending on the [`RepoMode`] and on whether the backend is distributed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::core::source_spec::SourceSpec;
use crate::db::lock::FileLock;
use crate::sources::adapter::{RepoHandle, ScanHints};
use crate::sources::registry::AdapterRegistry;
use crate::util::errors::{DbError, DbResult};

/// How much a managed repository talks to its remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepoMode {
    /// Never contact the remote.
    #[default]
    Get,
    /// Pull before reading.
    Pull,
    /// Pull before reading, push after writing.
    Push,
}

impl RepoMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RepoMode::Get => "get",
            RepoMode::Pull => "pull",
            RepoMode::Push => "push",
        }
    }

    /// Steps run before the data is read.
    pub fn read_steps(self, distributed: bool) -> &'static [RepoStep] {
        match (self, distributed) {
            (RepoMode::Get, _) => &[],
            (_, true) => &[RepoStep::PullMerge],
            (_, false) => &[RepoStep::Update],
        }
    }

    /// Steps run after the data was written.
    pub fn write_steps(self, distributed: bool) -> &'static [RepoStep] {
        match (self, distributed) {
            (RepoMode::Push, true) => &[RepoStep::Commit, RepoStep::Push],
            (_, true) => &[RepoStep::Commit],
            (RepoMode::Push, false) => &[RepoStep::Commit],
            (_, false) => &[],
        }
    }
}

impl fmt::Display for RepoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoMode {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        match s {
            "get" => Ok(RepoMode::Get),
            "pull" => Ok(RepoMode::Pull),
            "push" => Ok(RepoMode::Push),
            other => Err(DbError::spec(format!(
                "unknown repository mode '{other}', expected get, pull or push"
            ))),
        }
    }
}

/// One operation on a working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoStep {
    Commit,
    Push,
    PullMerge,
    Update,
}

/// A directory whose contents are synchronized with a repository.
///
/// When no repository is found, or the directory cannot be locked, the
/// object is inert and every operation is a no-op.
#[derive(Debug)]
pub struct ManagedRepository {
    directory: PathBuf,
    mode: RepoMode,
    handle: Option<Box<dyn RepoHandle>>,
    lock: FileLock,
    dry_run: bool,
}

impl ManagedRepository {
    /// Open the repository at `directory`, checking out `source` first if
    /// the directory does not exist yet.
    pub fn open(
        registry: &AdapterRegistry,
        directory: &Path,
        mode: RepoMode,
        source: Option<&SourceSpec>,
        lock_timeout: u32,
        dry_run: bool,
    ) -> DbResult<Self> {
        let mut repo = ManagedRepository {
            directory: directory.to_path_buf(),
            mode,
            handle: None,
            lock: FileLock::new(directory.join("repo"), lock_timeout),
            dry_run,
        };

        if !directory.exists() {
            let Some(source) = source else {
                debug!("{} does not exist, nothing to manage", directory.display());
                return Ok(repo);
            };
            let mut create_lock = FileLock::new(directory, lock_timeout);
            create_lock.acquire()?;
            let result = if directory.exists() {
                Ok(())
            } else {
                info!("checking out {} into {}", source.url, directory.display());
                registry.checkout(source, directory)
            };
            create_lock.release()?;
            result?;
        }
        if !directory.is_dir() {
            return Err(DbError::spec(format!(
                "'{}' is not a directory",
                directory.display()
            )));
        }

        match repo.lock.acquire() {
            Ok(()) => {}
            Err(e @ (DbError::Locked { .. } | DbError::Access { .. })) => {
                if mode != RepoMode::Get {
                    warn!("{e}; repository operations disabled for now");
                }
                return Ok(repo);
            }
            Err(e) => return Err(e),
        }
        let scanned = registry.scan_repository(directory, &ScanHints::default());
        repo.lock.release()?;
        repo.handle = scanned?;
        if repo.handle.is_none() {
            debug!("{} is not under version control", directory.display());
        }
        Ok(repo)
    }

    /// Wrap an already scanned working copy.
    pub fn from_handle(
        handle: Box<dyn RepoHandle>,
        mode: RepoMode,
        lock_timeout: u32,
        dry_run: bool,
    ) -> Self {
        let directory = handle.directory().to_path_buf();
        ManagedRepository {
            lock: FileLock::new(directory.join("repo"), lock_timeout),
            directory,
            mode,
            handle: Some(handle),
            dry_run,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn mode(&self) -> RepoMode {
        self.mode
    }

    /// Whether a working copy was found and operations are enabled.
    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Bring the working copy up to date before reading.
    pub fn prepare_read(&mut self) -> DbResult<()> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        let steps = self.mode.read_steps(handle.is_distributed());
        self.run(steps, "")
    }

    /// Record a write, committing and pushing as the mode asks.
    pub fn finish_write(&mut self, message: &str) -> DbResult<()> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        let steps = self.mode.write_steps(handle.is_distributed());
        self.run(steps, message)
    }

    fn run(&mut self, steps: &[RepoStep], message: &str) -> DbResult<()> {
        if steps.is_empty() {
            return Ok(());
        }
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        if self.dry_run {
            info!("dry-run: would run {:?} in {}", steps, self.directory.display());
            return Ok(());
        }
        self.lock.acquire()?;
        let mut result = Ok(());
        for step in steps {
            debug!("{:?} in {}", step, self.directory.display());
            result = match step {
                RepoStep::Commit => handle.commit(message),
                RepoStep::Push => handle.push(),
                RepoStep::PullMerge => handle.pull_and_merge(),
                RepoStep::Update => handle.update(),
            };
            if result.is_err() {
                break;
            }
        }
        self.lock.release()?;
        result
    }
}
