//! Locked, atomically saved JSON documents.
//!
//! [`Document`] owns one database mapping together with the path it was
//! read from and, while a read-modify-write session is running, the
//! [`FileLock`] protecting that path. The lock is dropped on every exit
//! path of `load` and `save` unless the caller asked to keep it.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::cache::BinaryCache;
use crate::db::lock::FileLock;
use crate::util::errors::{DbError, DbResult};
use crate::util::{fs as dfs, json};

/// Content types that can live in a [`Document`].
pub trait DocumentData: Serialize + DeserializeOwned + Default {
    /// Human readable name used in error messages.
    const KIND: &'static str;

    /// Structural validation run after every load.
    fn selfcheck(&self, _origin: &str) -> DbResult<()> {
        Ok(())
    }

    /// Text written by [`Document::save`].
    fn persisted_text(&self) -> DbResult<String> {
        json::to_string_sorted(self)
    }
}

/// How [`Document::load`] deals with locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub use_lock: bool,
    /// Keep the lock after loading, for a later `save`.
    pub keep_lock: bool,
    /// Retries, one per second.
    pub timeout: u32,
}

impl LoadOptions {
    /// Locked read, lock released right away.
    pub fn read(timeout: u32) -> Self {
        LoadOptions {
            use_lock: true,
            keep_lock: false,
            timeout,
        }
    }

    /// Locked read that keeps the lock for an edit session.
    pub fn edit(timeout: u32) -> Self {
        LoadOptions {
            use_lock: true,
            keep_lock: true,
            timeout,
        }
    }

    pub fn unlocked() -> Self {
        LoadOptions {
            use_lock: false,
            keep_lock: false,
            timeout: 0,
        }
    }
}

#[derive(Debug)]
pub struct Document<T> {
    data: T,
    path: Option<PathBuf>,
    lock: Option<FileLock>,
    use_lock: bool,
    timeout: u32,
}

impl<T: DocumentData> Default for Document<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: DocumentData> Document<T> {
    /// Wrap in-memory data that has no file yet.
    pub fn new(data: T) -> Self {
        Document {
            data,
            path: None,
            lock: None,
            use_lock: true,
            timeout: 0,
        }
    }

    /// Parse a document from a JSON string.
    pub fn from_json_str(text: &str, origin: &str) -> DbResult<Self> {
        let data: T = json::from_str(text, T::KIND, origin)?;
        data.selfcheck(origin)?;
        Ok(Self::new(data))
    }

    /// Read `path`, which may be `-` for stdin.
    pub fn load(path: &Path, opts: LoadOptions) -> DbResult<Self> {
        let origin = format!("(created from JSON file {})", path.display());
        if path.as_os_str() == json::STDIN_PATH {
            let text = json::read_text(path)?;
            let data: T = json::from_str(&text, T::KIND, "stdin")?;
            data.selfcheck("(created from JSON string on stdin)")?;
            return Ok(Self::new(data));
        }
        if !path.exists() {
            return Err(DbError::io(
                "read",
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            ));
        }

        let mut lock = None;
        let data: T = if !opts.use_lock {
            json::load_file(path, T::KIND)?
        } else {
            let mut file_lock = FileLock::new(path, opts.timeout);
            match file_lock.acquire() {
                Ok(()) => {
                    let loaded = json::load_file(path, T::KIND);
                    if opts.keep_lock && loaded.is_ok() {
                        lock = Some(file_lock);
                    } else {
                        file_lock.release()?;
                    }
                    loaded?
                }
                Err(e) if e.is_access() && !opts.keep_lock => {
                    tracing::info!(
                        "cannot lock {}, reading without lock",
                        path.display()
                    );
                    consistent_read(path, opts.timeout)?
                }
                Err(e) => return Err(e),
            }
        };

        data.selfcheck(&origin)?;
        Ok(Document {
            data,
            path: Some(path.to_path_buf()),
            lock,
            use_lock: opts.use_lock,
            timeout: opts.timeout,
        })
    }

    /// Like [`Document::load`], but a missing file yields an empty
    /// document bound to `path`. With `keep_lock` the lock is taken even
    /// then, so the first save happens under it.
    pub fn load_or_default(path: &Path, opts: LoadOptions) -> DbResult<Self> {
        if path.as_os_str() != json::STDIN_PATH && !path.exists() {
            tracing::debug!("{} does not exist yet, starting empty", path.display());
            let mut doc = Self::default();
            doc.path = Some(path.to_path_buf());
            doc.use_lock = opts.use_lock;
            doc.timeout = opts.timeout;
            if !(opts.use_lock && opts.keep_lock) {
                return Ok(doc);
            }
            doc.lock()?;
            if !path.exists() {
                return Ok(doc);
            }
            // created while we were waiting for the lock
            let origin = format!("(created from JSON file {})", path.display());
            let loaded = json::load_file::<T>(path, T::KIND).and_then(|data| {
                data.selfcheck(&origin)?;
                Ok(data)
            });
            return match loaded {
                Ok(data) => {
                    doc.data = data;
                    Ok(doc)
                }
                Err(e) => {
                    doc.unlock()?;
                    Err(e)
                }
            };
        }
        Self::load(path, opts)
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Bind to another file, dropping a lock on the old one.
    pub fn set_path(&mut self, path: PathBuf) -> DbResult<()> {
        if self.path.as_deref() == Some(path.as_path()) {
            return Ok(());
        }
        self.unlock()?;
        self.path = Some(path);
        Ok(())
    }

    pub fn set_use_lock(&mut self, use_lock: bool) {
        self.use_lock = use_lock;
    }

    pub fn is_locked(&self) -> bool {
        self.lock.as_ref().is_some_and(FileLock::is_held)
    }

    /// Take the file lock unless already held.
    pub fn lock(&mut self) -> DbResult<()> {
        if !self.use_lock || self.is_locked() {
            return Ok(());
        }
        let path = self.path.clone().ok_or_else(|| DbError::LockState {
            path: PathBuf::new(),
            message: format!("cannot lock {} document: filename is not set", T::KIND),
        })?;
        let mut lock = FileLock::new(&path, self.timeout);
        lock.acquire()?;
        self.lock = Some(lock);
        Ok(())
    }

    pub fn unlock(&mut self) -> DbResult<()> {
        match self.lock.take() {
            Some(mut lock) if lock.is_held() => lock.release(),
            _ => Ok(()),
        }
    }

    pub fn to_json_string(&self) -> DbResult<String> {
        self.data.persisted_text()
    }

    /// Write the document to `path` (or its own path).
    ///
    /// The old file is kept as `<path>.bak` and the new one is renamed into
    /// place. Any lock is released afterwards, also on failure. In a dry run
    /// only a log message is emitted.
    pub fn save(&mut self, path: Option<&Path>, dry_run: bool) -> DbResult<()> {
        if let Some(p) = path {
            if p.as_os_str() == json::STDIN_PATH {
                return Err(DbError::spec("filename must not be \"-\""));
            }
            if dry_run {
                self.path = Some(p.to_path_buf());
            } else {
                self.set_path(p.to_path_buf())?;
            }
        }
        let target = self.path.clone().ok_or_else(|| {
            DbError::spec(format!("no file name given for {} document", T::KIND))
        })?;

        if dry_run {
            tracing::info!("dry run: would write {}", target.display());
            return Ok(());
        }

        let written = self.write_locked(&target);
        let unlocked = self.unlock();
        written?;
        unlocked
    }

    fn write_locked(&mut self, target: &Path) -> DbResult<()> {
        self.lock()?;
        let text = self.data.persisted_text()?;
        dfs::backup_file(target)?;
        dfs::write_atomic(target, text.as_bytes(), None)?;
        tracing::debug!("wrote {}", target.display());
        Ok(())
    }

    /// Store the document in a binary cache, without any locking.
    pub fn cache_save(&self, cache: &BinaryCache, key: &str) -> DbResult<()> {
        let text = self.data.persisted_text()?;
        cache.store_bytes(key, text.as_bytes())
    }

    /// Restore a document from a binary cache; `None` on a miss.
    pub fn cache_load(cache: &BinaryCache, key: &str) -> Option<Self> {
        let bytes = cache.fetch_bytes(key)?;
        let text = String::from_utf8(bytes).ok()?;
        match Self::from_json_str(&text, "cache") {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::debug!("discarding cached {} document: {}", T::KIND, e);
                cache.remove(key);
                None
            }
        }
    }
}

/// Read without a lock, retrying while the file is changing underneath us.
///
/// A file that still does not parse after the retries is reported as a
/// parse error, a file that keeps changing as an inconsistent read.
fn consistent_read<T: DocumentData>(path: &Path, timeout: u32) -> DbResult<T> {
    consistent_read_with(path, timeout, |p| json::load_file::<T>(p, T::KIND))
}

fn consistent_read_with<T, F>(path: &Path, timeout: u32, mut read: F) -> DbResult<T>
where
    F: FnMut(&Path) -> DbResult<T>,
{
    let mut retries = timeout;
    loop {
        let before = dfs::mtime_nanos(path);
        let parsed = read(path);
        let data = match parsed {
            Ok(data) => data,
            Err(e @ DbError::Parse { .. }) => {
                if retries == 0 {
                    return Err(e);
                }
                retries -= 1;
                thread::sleep(Duration::from_secs(1));
                continue;
            }
            Err(e) => return Err(e),
        };
        if dfs::mtime_nanos(path) != before {
            if retries == 0 {
                return Err(DbError::InconsistentRead {
                    path: path.to_path_buf(),
                });
            }
            retries -= 1;
            thread::sleep(Duration::from_secs(1));
            continue;
        }
        return Ok(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::lock::lock_path_for;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Debug, Default, PartialEq, Serialize, serde::Deserialize)]
    #[serde(transparent)]
    struct Plain(BTreeMap<String, Vec<String>>);

    impl DocumentData for Plain {
        const KIND: &'static str = "plain";

        fn selfcheck(&self, origin: &str) -> DbResult<()> {
            if self.0.contains_key("") {
                return Err(DbError::Invalid {
                    kind: Self::KIND,
                    message: "empty key".to_string(),
                    origin: origin.to_string(),
                });
            }
            Ok(())
        }
    }

    const SAMPLE: &str = "{\n    \"a\": [\n        \"x\"\n    ],\n    \"b\": []\n}\n";

    #[test]
    fn test_load_save_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");
        fs::write(&path, SAMPLE).unwrap();

        let mut doc: Document<Plain> = Document::load(&path, LoadOptions::read(0)).unwrap();
        assert!(!doc.is_locked());
        doc.save(None, false).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), SAMPLE);
        assert_eq!(fs::read_to_string(dfs::backup_path(&path)).unwrap(), SAMPLE);
        assert!(lock_path_for(&path).symlink_metadata().is_err());
    }

    #[test]
    fn test_keep_lock_blocks_second_reader() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");
        fs::write(&path, SAMPLE).unwrap();

        let mut editor: Document<Plain> = Document::load(&path, LoadOptions::edit(0)).unwrap();
        assert!(editor.is_locked());

        let second = Document::<Plain>::load(&path, LoadOptions::read(0));
        assert!(matches!(second, Err(DbError::Locked { .. })));

        editor
            .data_mut()
            .0
            .insert("c".to_string(), vec!["y".to_string()]);
        editor.save(None, false).unwrap();
        assert!(!editor.is_locked());

        let reread: Document<Plain> = Document::load(&path, LoadOptions::read(0)).unwrap();
        assert!(reread.data().0.contains_key("c"));
    }

    #[test]
    fn test_unlocked_load_ignores_lock() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");
        fs::write(&path, SAMPLE).unwrap();
        let _editor: Document<Plain> = Document::load(&path, LoadOptions::edit(0)).unwrap();
        assert!(Document::<Plain>::load(&path, LoadOptions::unlocked()).is_ok());
    }

    #[test]
    fn test_parse_error_releases_lock() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");
        fs::write(&path, "{ broken").unwrap();
        let err = Document::<Plain>::load(&path, LoadOptions::edit(0)).unwrap_err();
        assert!(matches!(err, DbError::Parse { .. }));
        assert!(lock_path_for(&path).symlink_metadata().is_err());
    }

    #[test]
    fn test_selfcheck_runs_on_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");
        fs::write(&path, "{\"\": []}").unwrap();
        let err = Document::<Plain>::load(&path, LoadOptions::unlocked()).unwrap_err();
        assert!(matches!(err, DbError::Invalid { kind: "plain", .. }));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");
        let mut doc = Document::new(Plain::default());
        doc.save(Some(&path), true).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_save_to_stdin_name_rejected() {
        let mut doc = Document::new(Plain::default());
        assert!(doc.save(Some(Path::new("-")), false).is_err());
    }

    #[test]
    fn test_load_or_default_for_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("NEW.DB");
        let mut doc: Document<Plain> =
            Document::load_or_default(&path, LoadOptions::read(0)).unwrap();
        assert!(doc.data().0.is_empty());
        doc.save(None, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn test_cache_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let cache = BinaryCache::new(tmp.path().join("cache"), Duration::from_secs(60));
        let doc: Document<Plain> = Document::from_json_str(SAMPLE, "inline").unwrap();
        doc.cache_save(&cache, "plain").unwrap();
        let back = Document::<Plain>::cache_load(&cache, "plain").unwrap();
        assert_eq!(back.data(), doc.data());
        assert!(Document::<Plain>::cache_load(&cache, "other").is_none());
    }

    #[test]
    fn test_edit_on_missing_file_holds_lock() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");

        let mut first: Document<Plain> =
            Document::load_or_default(&path, LoadOptions::edit(0)).unwrap();
        assert!(first.is_locked());
        let second = Document::<Plain>::load_or_default(&path, LoadOptions::edit(0));
        assert!(matches!(second, Err(DbError::Locked { .. })));

        first.data_mut().0.insert("a".to_string(), Vec::new());
        first.save(None, false).unwrap();
        assert!(lock_path_for(&path).symlink_metadata().is_err());

        let second: Document<Plain> =
            Document::load_or_default(&path, LoadOptions::edit(0)).unwrap();
        assert!(second.data().0.contains_key("a"));
    }

    #[test]
    fn test_consistent_read_of_stable_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");
        fs::write(&path, SAMPLE).unwrap();

        let data: Plain = consistent_read(&path, 0).unwrap();
        assert_eq!(data.0["a"], vec!["x".to_string()]);
    }

    #[test]
    fn test_consistent_read_of_broken_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");
        fs::write(&path, "{\"a\": [").unwrap();

        let result = consistent_read::<Plain>(&path, 0);
        assert!(matches!(result, Err(DbError::Parse { .. })));
    }

    fn touch(path: &Path, secs: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(std::time::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_consistent_read_of_changing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");
        fs::write(&path, SAMPLE).unwrap();

        let mut stamp = 1_000_000;
        let result = consistent_read_with(&path, 0, |p| {
            let data = json::load_file::<Plain>(p, Plain::KIND);
            stamp += 1;
            touch(p, stamp);
            data
        });
        assert!(matches!(result, Err(DbError::InconsistentRead { .. })));
    }

    #[test]
    fn test_consistent_read_retries_after_change() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("DB");
        fs::write(&path, SAMPLE).unwrap();

        let mut reads = 0;
        let data = consistent_read_with(&path, 1, |p| {
            reads += 1;
            if reads == 1 {
                touch(p, 2_000_000);
            }
            json::load_file::<Plain>(p, Plain::KIND)
        })
        .unwrap();
        assert_eq!(reads, 2);
        assert!(data.0.contains_key("b"));
    }
}
