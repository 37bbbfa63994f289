//! Module sources.
//!
//! Sources describe where the code of a module version lives. Each kind
//! (directory, tar file, version control system) is handled by a
//! [`RepositoryAdapter`]; the [`AdapterRegistry`] picks one by kind or by
//! probing a directory.

pub mod adapter;
pub mod managed;
pub mod path;
pub mod registry;

pub use adapter::{RepoHandle, RepositoryAdapter, ScanHints};
pub use managed::{ManagedRepository, RepoMode, RepoStep};
pub use path::PathAdapter;
pub use registry::AdapterRegistry;
