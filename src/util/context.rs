//! Global context for drydock operations.
//!
//! Collects the database locations and the locking/dry-run policy that
//! every command needs, resolved from configuration files and command line
//! flags.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::sources::managed::RepoMode;
use crate::util::config::ConfigFile;

/// Default file name of the dependency database inside `dbdir`.
pub const DEPS_FILE_NAME: &str = "DEPS.DB";

/// Default file name of the build database inside `dbdir`.
pub const BUILDS_FILE_NAME: &str = "BUILDS.DB";

/// Maximum age of binary cache entries.
pub const CACHE_MAX_AGE: Duration = Duration::from_secs(60 * 60);

static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("org", "drydock", "drydock"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    cwd: PathBuf,
    dbdir: PathBuf,
    deps_file: PathBuf,
    builds_file: PathBuf,
    overlays: Vec<PathBuf>,
    repo_mode: RepoMode,
    /// Lock retries, one per second.
    lock_timeout: u32,
    use_lock: bool,
    dry_run: bool,
    verbose: bool,
    cache_dir: PathBuf,
}

impl GlobalContext {
    /// Create a context rooted at the current directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    pub fn with_cwd(cwd: PathBuf) -> Self {
        let cache_dir = match PROJECT_DIRS.as_ref() {
            Some(dirs) => dirs.cache_dir().to_path_buf(),
            None => cwd.join(".drydock-cache"),
        };
        let dbdir = cwd.clone();
        GlobalContext {
            deps_file: dbdir.join(DEPS_FILE_NAME),
            builds_file: dbdir.join(BUILDS_FILE_NAME),
            dbdir,
            cwd,
            overlays: Vec::new(),
            repo_mode: RepoMode::Get,
            lock_timeout: 0,
            use_lock: true,
            dry_run: false,
            verbose: false,
            cache_dir,
        }
    }

    /// Apply the values of a loaded configuration.
    pub fn apply_config(&mut self, config: &ConfigFile) -> Result<()> {
        if let Some(dir) = config.get_str("dbdir") {
            self.set_dbdir(PathBuf::from(dir));
        }
        if let Some(file) = config.get_str("dbfile") {
            self.deps_file = self.dbdir.join(file);
        }
        if let Some(file) = config.get_str("builddb") {
            self.builds_file = self.dbdir.join(file);
        }
        self.overlays
            .extend(config.get_list("overlay").into_iter().map(PathBuf::from));
        if let Some(mode) = config.get_str("dbrepomode") {
            self.repo_mode = mode.parse()?;
        }
        if let Some(timeout) = config.get_str("lock-timeout") {
            self.lock_timeout = timeout
                .trim()
                .parse()
                .with_context(|| format!("lock-timeout is not a number: {:?}", timeout))?;
        }
        self.dry_run |= config.get_bool("dry-run");
        self.verbose |= config.get_bool("verbose");
        Ok(())
    }

    /// Point both databases at `dir`, keeping their file names.
    pub fn set_dbdir(&mut self, dir: PathBuf) {
        let dir = if dir.is_absolute() { dir } else { self.cwd.join(dir) };
        self.deps_file = dir.join(file_name_or(&self.deps_file, DEPS_FILE_NAME));
        self.builds_file = dir.join(file_name_or(&self.builds_file, BUILDS_FILE_NAME));
        self.dbdir = dir;
    }

    pub fn set_repo_mode(&mut self, mode: RepoMode) {
        self.repo_mode = mode;
    }

    pub fn set_lock_timeout(&mut self, retries: u32) {
        self.lock_timeout = retries;
    }

    pub fn set_use_lock(&mut self, use_lock: bool) {
        self.use_lock = use_lock;
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_cache_dir(&mut self, dir: PathBuf) {
        self.cache_dir = dir;
    }

    pub fn add_overlay(&mut self, path: PathBuf) {
        self.overlays.push(path);
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn dbdir(&self) -> &Path {
        &self.dbdir
    }

    /// Path of the dependency database.
    pub fn deps_file(&self) -> &Path {
        &self.deps_file
    }

    /// Path of the build database.
    pub fn builds_file(&self) -> &Path {
        &self.builds_file
    }

    pub fn overlays(&self) -> &[PathBuf] {
        &self.overlays
    }

    /// How the database directory talks to its repository.
    pub fn repo_mode(&self) -> RepoMode {
        self.repo_mode
    }

    pub fn lock_timeout(&self) -> u32 {
        self.lock_timeout
    }

    pub fn use_lock(&self) -> bool {
        self.use_lock
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Directory of the disposable binary caches.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

fn file_name_or(path: &Path, default: &str) -> PathBuf {
    path.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}
