//! Configuration file support.
//!
//! Configuration files are JSON objects whose keys come from a fixed
//! allow-list, split into boolean, string and string-list options. Every
//! existing `drydock.config` along the search path is loaded in order:
//!
//! - the directories named in `$DRYDOCK_CONFIG_PATH` (colon separated), or
//! - `/etc`, the user's home directory and the current directory.
//!
//! Later files override scalar options; list options are merged into a
//! sorted list without duplicates. The special keys `#preload`, `#include`
//! and `#opt-preload` name files loaded *before* the current one,
//! `#postload` and `#opt-postload` files loaded *after* it. The `opt-`
//! variants may name files that do not exist.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::util::errors::{DbError, DbResult};
use crate::util::{fs as dfs, json};

/// Name of the configuration file looked for in every search directory.
pub const CONFIG_FILE_NAME: &str = "drydock.config";

/// Environment variable overriding the search directories.
pub const CONFIG_PATH_ENV: &str = "DRYDOCK_CONFIG_PATH";

const PRELOAD_KEYS: &[(&str, bool)] = &[("#include", true), ("#preload", true), ("#opt-preload", false)];
const POSTLOAD_KEYS: &[(&str, bool)] = &[("#postload", true), ("#opt-postload", false)];

/// The allow-list of keys understood by one tool.
#[derive(Debug, Clone, Copy)]
pub struct OptionSet {
    pub bools: &'static [&'static str],
    pub strings: &'static [&'static str],
    pub lists: &'static [&'static str],
}

/// Options of the `drydock` binary.
pub const DRYDOCK_OPTIONS: OptionSet = OptionSet {
    bools: &["verbose", "dry-run"],
    strings: &["dbdir", "dbfile", "builddb", "dbrepomode", "lock-timeout"],
    lists: &["overlay", "module"],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionKind {
    Bool,
    Str,
    List,
}

impl OptionSet {
    fn kind(&self, key: &str) -> Option<OptionKind> {
        if self.bools.contains(&key) {
            Some(OptionKind::Bool)
        } else if self.strings.contains(&key) {
            Some(OptionKind::Str)
        } else if self.lists.contains(&key) {
            Some(OptionKind::List)
        } else {
            None
        }
    }
}

/// Merged configuration from one or more files.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    options: OptionSet,
    values: BTreeMap<String, Value>,
    loaded: Vec<PathBuf>,
}

impl ConfigFile {
    pub fn new(options: OptionSet) -> Self {
        ConfigFile {
            options,
            values: BTreeMap::new(),
            loaded: Vec::new(),
        }
    }

    /// Configuration files that exist along the search path.
    pub fn search_paths(cwd: &Path) -> Vec<PathBuf> {
        let dirs: Vec<PathBuf> = match std::env::var(CONFIG_PATH_ENV) {
            Ok(spec) if !spec.trim().is_empty() => spec
                .split(':')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect(),
            _ => {
                let mut dirs = vec![PathBuf::from("/etc")];
                if let Some(base) = directories::BaseDirs::new() {
                    dirs.push(base.home_dir().to_path_buf());
                }
                dirs.push(cwd.to_path_buf());
                dirs
            }
        };
        dirs.into_iter()
            .map(|d| d.join(CONFIG_FILE_NAME))
            .filter(|p| p.is_file())
            .collect()
    }

    /// Load every file in `paths`; each must exist.
    pub fn load(&mut self, paths: &[PathBuf]) -> DbResult<()> {
        for path in paths {
            self.load_file(path, true)?;
        }
        Ok(())
    }

    /// Load one file together with its pre- and post-load files.
    pub fn load_file(&mut self, path: &Path, must_exist: bool) -> DbResult<()> {
        if !path.exists() {
            if !must_exist {
                return Ok(());
            }
            return Err(DbError::io(
                "read",
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "file doesn't exist"),
            ));
        }
        tracing::debug!("loading config file {}", path.display());
        self.loaded.push(path.to_path_buf());

        let file = path.display().to_string();
        let mut data: BTreeMap<String, Value> = json::load_file(path, "config")?;

        let pre = take_file_lists(&mut data, PRELOAD_KEYS, &file)?;
        for (f, required) in pre {
            self.load_file(&f, required)?;
        }
        let post = take_file_lists(&mut data, POSTLOAD_KEYS, &file)?;

        self.merge(data, true, &file)?;

        for (f, required) in post {
            self.load_file(&f, required)?;
        }
        Ok(())
    }

    /// Merge known keys from `data`.
    fn merge(&mut self, data: BTreeMap<String, Value>, append_lists: bool, file: &str) -> DbResult<()> {
        for (key, value) in data {
            let Some(kind) = self.options.kind(&key) else {
                return Err(DbError::UnknownOption {
                    key,
                    file: file.to_string(),
                });
            };
            let type_error = |expected| DbError::OptionType {
                key: key.clone(),
                file: file.to_string(),
                expected,
            };
            match kind {
                OptionKind::Bool if !value.is_boolean() => return Err(type_error("bool")),
                OptionKind::Str if !value.is_string() => return Err(type_error("string")),
                OptionKind::List => {
                    let items = string_list(&value).ok_or_else(|| type_error("list of strings"))?;
                    let merged = match (append_lists, self.values.get(&key)) {
                        (true, Some(old)) => {
                            let mut set: BTreeSet<String> =
                                string_list(old).unwrap_or_default().into_iter().collect();
                            set.extend(items);
                            set.into_iter().collect()
                        }
                        _ => {
                            let mut items = items;
                            items.sort();
                            items.dedup();
                            items
                        }
                    };
                    self.values.insert(key, Value::from(merged));
                    continue;
                }
                _ => {}
            }
            self.values.insert(key, value);
        }
        Ok(())
    }

    /// Apply command line values on top of the loaded ones.
    ///
    /// Scalars replace; lists are merged when `append_lists` is set.
    pub fn merge_cli(&mut self, overrides: BTreeMap<String, Value>, append_lists: bool) -> DbResult<()> {
        self.merge(overrides, append_lists, "<command line>")
    }

    /// Files actually read, in load order.
    pub fn loaded_paths(&self) -> &[PathBuf] {
        &self.loaded
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.values
            .get(key)
            .and_then(string_list)
            .unwrap_or_default()
    }

    /// Set a known option, checking its type.
    pub fn set(&mut self, key: &str, value: Value) -> DbResult<()> {
        let mut one = BTreeMap::new();
        one.insert(key.to_string(), value);
        self.merge(one, false, "<set>")
    }

    /// Canonical JSON text of the current values.
    pub fn to_json_string(&self) -> DbResult<String> {
        json::to_string_sorted(&self.values)
    }

    /// Write the current values to `path`, keeping a backup.
    pub fn save(&self, path: &Path, dry_run: bool) -> DbResult<()> {
        let text = self.to_json_string()?;
        if dry_run {
            tracing::info!("dry run: would write {}", path.display());
            return Ok(());
        }
        dfs::backup_file(path)?;
        dfs::write_atomic(path, text.as_bytes(), None)
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn take_file_lists(
    data: &mut BTreeMap<String, Value>,
    keys: &[(&str, bool)],
    file: &str,
) -> DbResult<Vec<(PathBuf, bool)>> {
    let mut files = Vec::new();
    for (key, required) in keys {
        let Some(value) = data.remove(*key) else {
            continue;
        };
        let list = string_list(&value).ok_or_else(|| DbError::OptionType {
            key: key.to_string(),
            file: file.to_string(),
            expected: "list of strings",
        })?;
        files.extend(list.into_iter().map(|f| (PathBuf::from(f), *required)));
    }
    Ok(files)
}
