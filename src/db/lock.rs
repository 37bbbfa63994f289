//! Cross-process exclusive locks on database files.
//!
//! Locking `FILE` creates a marker `FILE.lock` next to it. On Unix the marker
//! is a symbolic link whose target names the holder as `user@host:pid`; on
//! other systems it is a directory containing a file with that name. Both
//! creations are atomic, so at most one process can own the marker.
//!
//! A lock left behind by a killed process stays in place until someone
//! removes the marker by hand.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::util::errors::{DbError, DbResult};

/// How the lock marker is represented on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMethod {
    /// Symbolic link pointing at the holder description.
    Symlink,
    /// Directory holding a file named after the holder.
    Directory,
}

impl LockMethod {
    /// The method used on this platform.
    pub fn native() -> Self {
        if cfg!(unix) {
            LockMethod::Symlink
        } else {
            LockMethod::Directory
        }
    }
}

/// Exclusive lock on one file.
///
/// Released on drop if still held.
#[derive(Debug)]
pub struct FileLock {
    target: PathBuf,
    lock_path: PathBuf,
    method: LockMethod,
    /// Number of one second retries before giving up.
    timeout: u32,
    held: bool,
}

impl FileLock {
    pub fn new(target: impl AsRef<Path>, timeout: u32) -> Self {
        Self::with_method(target, timeout, LockMethod::native())
    }

    pub fn with_method(target: impl AsRef<Path>, timeout: u32, method: LockMethod) -> Self {
        let target = target.as_ref().to_path_buf();
        FileLock {
            lock_path: lock_path_for(&target),
            target,
            method,
            timeout,
            held: false,
        }
    }

    /// Create the marker, retrying once a second up to the timeout.
    pub fn acquire(&mut self) -> DbResult<()> {
        if self.held {
            return Err(DbError::LockState {
                path: self.target.clone(),
                message: "cannot lock twice".to_string(),
            });
        }
        let holder = holder_info();
        let mut retries = self.timeout;
        loop {
            match self.create_marker(&holder) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if retries > 0 {
                        retries -= 1;
                        thread::sleep(Duration::from_secs(1));
                        continue;
                    }
                    return Err(DbError::Locked {
                        path: self.target.clone(),
                        holder: self.current_holder().unwrap_or_default(),
                    });
                }
                Err(e) => return Err(self.classify(e)),
            }
        }
        tracing::debug!("locked {}", self.target.display());
        self.held = true;
        Ok(())
    }

    /// Remove the marker. Fails if this lock was not taken.
    pub fn release(&mut self) -> DbResult<()> {
        if !self.held {
            return Err(DbError::LockState {
                path: self.target.clone(),
                message: "cannot unlock since a lock wasn't taken".to_string(),
            });
        }
        self.remove_marker()
            .map_err(|e| DbError::io("remove lock", &self.lock_path, e))?;
        self.held = false;
        tracing::debug!("unlocked {}", self.target.display());
        Ok(())
    }

    /// Remove the marker whether or not we own it, ignoring errors.
    pub fn force_release(&mut self) {
        if let Err(e) = self.remove_marker() {
            tracing::debug!("ignoring error while removing {}: {}", self.lock_path.display(), e);
        }
        self.held = false;
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Description of whoever currently owns the marker.
    pub fn current_holder(&self) -> Option<String> {
        match self.method {
            LockMethod::Symlink => fs::read_link(&self.lock_path)
                .ok()
                .map(|p| p.to_string_lossy().into_owned()),
            LockMethod::Directory => {
                let names: Vec<String> = fs::read_dir(&self.lock_path)
                    .ok()?
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                Some(names.join(" "))
            }
        }
    }

    fn create_marker(&self, holder: &str) -> io::Result<()> {
        match self.method {
            LockMethod::Symlink => make_symlink(holder, &self.lock_path),
            LockMethod::Directory => {
                fs::create_dir(&self.lock_path)?;
                // ':' is not allowed in file names everywhere.
                fs::File::create(self.lock_path.join(holder.replace(':', "_")))?;
                Ok(())
            }
        }
    }

    fn remove_marker(&self) -> io::Result<()> {
        match self.method {
            LockMethod::Symlink => fs::remove_file(&self.lock_path),
            LockMethod::Directory => fs::remove_dir_all(&self.lock_path),
        }
    }

    fn classify(&self, e: io::Error) -> DbError {
        match e.kind() {
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => DbError::Access {
                path: self.target.clone(),
            },
            io::ErrorKind::NotFound => DbError::MissingPath {
                lock: self.lock_path.clone(),
            },
            _ => DbError::io("create lock", &self.lock_path, e),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self.held {
            self.force_release();
        }
    }
}

/// `FILE` -> `FILE.lock`
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// `user@host:pid` for the current process.
pub fn holder_info() -> String {
    format!("{}@{}:{}", current_user(), hostname(), std::process::id())
}

fn current_user() -> String {
    ["USER", "LOGNAME", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn hostname() -> String {
    if let Ok(name) = fs::read_to_string("/etc/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(unix)]
fn make_symlink(holder: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(holder, link)
}

#[cfg(not(unix))]
fn make_symlink(_holder: &str, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic link locks are only available on unix",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_lock_fails_until_release() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("DEPS.DB");

        let mut first = FileLock::new(&db, 0);
        first.acquire().unwrap();
        assert!(first.lock_path().exists() || first.lock_path().symlink_metadata().is_ok());

        let mut second = FileLock::new(&db, 0);
        let err = second.acquire().unwrap_err();
        match err {
            DbError::Locked { holder, .. } => {
                assert!(holder.ends_with(&format!(":{}", std::process::id())))
            }
            other => panic!("unexpected error: {other:?}"),
        }

        first.release().unwrap();
        second.acquire().unwrap();
        second.release().unwrap();
    }

    #[test]
    fn test_directory_method() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("BUILDS.DB");

        let mut lock = FileLock::with_method(&db, 0, LockMethod::Directory);
        lock.acquire().unwrap();
        assert!(lock.lock_path().is_dir());
        let holder = lock.current_holder().unwrap();
        assert!(holder.contains('@'));

        let mut other = FileLock::with_method(&db, 0, LockMethod::Directory);
        assert!(matches!(other.acquire(), Err(DbError::Locked { .. })));

        lock.release().unwrap();
        assert!(!lock.lock_path().exists());
    }

    #[test]
    fn test_release_without_lock_is_error() {
        let tmp = TempDir::new().unwrap();
        let mut lock = FileLock::new(tmp.path().join("X"), 0);
        assert!(matches!(lock.release(), Err(DbError::LockState { .. })));
        lock.force_release();
    }

    #[test]
    fn test_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let mut lock = FileLock::new(tmp.path().join("nodir").join("DEPS.DB"), 0);
        assert!(matches!(lock.acquire(), Err(DbError::MissingPath { .. })));
    }

    #[test]
    fn test_drop_releases() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("DEPS.DB");
        {
            let mut lock = FileLock::new(&db, 0);
            lock.acquire().unwrap();
        }
        assert!(lock_path_for(&db).symlink_metadata().is_err());
    }

    #[test]
    fn test_lock_path_for() {
        assert_eq!(
            lock_path_for(Path::new("/db/DEPS.DB")),
            PathBuf::from("/db/DEPS.DB.lock")
        );
    }
}
