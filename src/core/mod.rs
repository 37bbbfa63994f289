//! Core value types for drydock.
//!
//! This module contains the foundational types used throughout drydock:
//! - Version keys for ordering version strings
//! - Module specifications and spec lists
//! - Source specifications

pub mod source_spec;
pub mod spec;
pub mod spec_list;
pub mod version;

pub use source_spec::{SourceKind, SourceSpec};
pub use spec::{VersionFlag, VersionSpec};
pub use spec_list::SpecList;
pub use version::VersionKey;
