//! Shared utilities

pub mod config;
pub mod context;
pub mod diagnostic;
pub mod errors;
pub mod fs;
pub mod hash;
pub mod json;

pub use config::ConfigFile;
pub use context::GlobalContext;
pub use diagnostic::Diagnostic;
pub use errors::{DbError, DbResult};
