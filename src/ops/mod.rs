//! High-level operations.
//!
//! This module contains the implementation of drydock commands that go
//! beyond a single database call: loading with overlays, locked edit
//! sessions, build lookup and registration.

pub mod complete;
pub mod edit;
pub mod find;
pub mod register;

pub use complete::{complete, module_versions, parse_specs};
pub use edit::{load_builds, load_deps, with_locked_db, EditableDb};
pub use find::{find_builds, FindOptions, FoundBuild};
pub use register::{register_build, RegisterOptions, Registered};
