//! Drydock - a dependency-aware module and build database manager
//!
//! This crate provides the core library functionality for drydock: module
//! specifications, the dependency and build databases with their locking
//! and atomic saves, and the orderings and matching built on top of them.

pub mod core;
pub mod db;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

/// Sample databases shared by the unit tests.
#[cfg(test)]
pub mod test_support;

pub use core::{source_spec::SourceSpec, spec::VersionSpec, spec_list::SpecList};
pub use db::{BuildDb, DependencyDb};
pub use util::context::GlobalContext;
pub use util::errors::{DbError, DbResult};
