//! Test utilities shared by the unit tests.

pub mod fixtures;

pub use fixtures::*;

use tempfile::TempDir;

use crate::db::builds::BuildDb;
use crate::db::deps::DependencyDb;

/// A temporary database directory holding the sample databases.
pub fn sample_dbdir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_sample_dbs(tmp.path());
    tmp
}

/// The sample dependency database, in memory.
pub fn sample_deps() -> DependencyDb {
    DependencyDb::from_json_str(DEPS_JSON, "fixture").unwrap()
}

/// The sample build database, in memory.
pub fn sample_builds() -> BuildDb {
    BuildDb::from_json_str(BUILDS_JSON, "fixture").unwrap()
}
