//! Filesystem utilities.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::util::errors::{DbError, DbResult};

/// Path of the backup copy kept next to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Copy `path` to `<path>.bak`, replacing an older backup.
///
/// Does nothing if `path` does not exist yet.
pub fn backup_file(path: &Path) -> DbResult<()> {
    if !path.exists() {
        return Ok(());
    }
    let backup = backup_path(path);
    fs::copy(path, &backup).map_err(|e| DbError::io("back up", path, e))?;
    Ok(())
}

/// Write `contents` to `dest` so that readers see either the old or the new
/// file, never a partial one.
///
/// The data goes to a temporary file in the destination directory, which
/// gets the permissions of `mode_file` (or of `dest`) before being renamed
/// into place. If neither exists, `mode_file` is created empty so that the
/// process umask decides the mode.
pub fn write_atomic(dest: &Path, contents: &[u8], mode_file: Option<&Path>) -> DbResult<()> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp =
        NamedTempFile::new_in(&dir).map_err(|e| DbError::io("create temporary file in", &dir, e))?;
    tmp.write_all(contents)
        .map_err(|e| DbError::io("write", tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| DbError::io("sync", tmp.path(), e))?;

    let reference = mode_file.unwrap_or(dest);
    if !reference.exists() {
        fs::File::create(reference).map_err(|e| DbError::io("create", reference, e))?;
    }
    let perms = fs::metadata(reference)
        .map_err(|e| DbError::io("stat", reference, e))?
        .permissions();
    fs::set_permissions(tmp.path(), perms).map_err(|e| DbError::io("chmod", tmp.path(), e))?;

    tmp.persist(dest)
        .map_err(|e| DbError::io("rename temporary file onto", dest, e.error))?;
    Ok(())
}

/// Recursively copy a directory.
pub fn copy_dir_all(src: &Path, dst: &Path) -> DbResult<()> {
    ensure_dir(dst)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            DbError::io("walk", path, e.into())
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| DbError::io("copy", entry.path(), e))?;
        }
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> DbResult<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| DbError::io("create directory", path, e))?;
    }
    Ok(())
}

/// Modification time of `path` in nanoseconds, if it can be read.
pub fn mtime_nanos(path: &Path) -> Option<u128> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_nanos())
}
