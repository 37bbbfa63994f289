//! Persistent databases.
//!
//! Both databases are JSON documents managed by [`document::Document`],
//! which handles locking and atomic saves.

pub mod builds;
pub mod cache;
pub mod deps;
pub mod document;
pub mod lock;

pub use builds::{BuildDb, BuildRecord, BuildState, MatchFlag, MatchResult};
pub use cache::BinaryCache;
pub use deps::{DependencyDb, ModuleVersion, SetsDict, VersionRecord};
pub use document::{Document, DocumentData, LoadOptions};
pub use lock::FileLock;
