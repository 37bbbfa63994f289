//! Error types shared by the module and build databases.

use std::io;
use std::path::{Path, PathBuf};

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Result alias used throughout the database layer.
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Error raised by the database, spec and locking layers.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum DbError {
    /// Malformed JSON or an unreadable spec string.
    #[error("{origin}: {message}")]
    #[diagnostic(code(drydock::json::parse))]
    Parse { origin: String, message: String },

    /// Another process holds the lock.
    #[error("file '{}' is locked: {holder}", path.display())]
    #[diagnostic(
        code(drydock::lock::locked),
        help("wait for the other process or pass --lock-timeout")
    )]
    Locked { path: PathBuf, holder: String },

    /// The lock marker cannot be created due to access rights.
    #[error("no rights to create lock for file '{}'", path.display())]
    #[diagnostic(code(drydock::lock::access))]
    Access { path: PathBuf },

    /// The directory that should contain the lock marker does not exist.
    #[error("cannot create {}, path doesn't exist", lock.display())]
    #[diagnostic(code(drydock::lock::missing_path))]
    MissingPath { lock: PathBuf },

    /// Lock was used in a way that does not match its state.
    #[error("lock on '{}': {message}", path.display())]
    #[diagnostic(code(drydock::lock::state))]
    LockState { path: PathBuf, message: String },

    /// An unlocked read never observed a stable file.
    #[error("file {}: cannot lock and cannot read consistently", path.display())]
    #[diagnostic(code(drydock::json::inconsistent))]
    InconsistentRead { path: PathBuf },

    /// Two sources disagree on a value that must be identical.
    #[error("{context}: contradiction {ours} {theirs}")]
    #[diagnostic(code(drydock::db::merge_conflict))]
    MergeConflict {
        context: String,
        ours: String,
        theirs: String,
    },

    /// Reference to an unknown module, version, build or dependency.
    #[error("{0}")]
    #[diagnostic(code(drydock::db::not_found))]
    NotFound(String),

    /// Malformed or contradictory module specification.
    #[error("{0}")]
    #[diagnostic(code(drydock::spec::invalid))]
    Spec(String),

    /// Mutation of a build owned by an overlay file.
    #[error("build '{tag}' belongs to {} and cannot be modified here", owner.display())]
    #[diagnostic(code(drydock::builds::read_only))]
    ReadOnly { tag: String, owner: PathBuf },

    /// Structurally invalid database content.
    #[error("{kind} data is invalid ({message}) {origin}")]
    #[diagnostic(code(drydock::db::invalid))]
    Invalid {
        kind: &'static str,
        message: String,
        origin: String,
    },

    /// Unknown key in a configuration file.
    #[error("file {file}: unknown key: {key:?}")]
    #[diagnostic(code(drydock::config::unknown_option))]
    UnknownOption { key: String, file: String },

    /// Configuration value of the wrong type.
    #[error("file {file}: value of key {key:?} is not a {expected}")]
    #[diagnostic(code(drydock::config::option_type))]
    OptionType {
        key: String,
        file: String,
        expected: &'static str,
    },

    /// Underlying filesystem failure.
    #[error("failed to {action} {}: {source}", path.display())]
    #[diagnostic(code(drydock::io))]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DbError {
    pub fn io(action: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        DbError::Io {
            action,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        DbError::NotFound(message.into())
    }

    pub fn spec(message: impl Into<String>) -> Self {
        DbError::Spec(message.into())
    }

    pub fn conflict(
        context: impl Into<String>,
        ours: impl std::fmt::Debug,
        theirs: impl std::fmt::Debug,
    ) -> Self {
        DbError::MergeConflict {
            context: context.into(),
            ours: format!("{:?}", ours),
            theirs: format!("{:?}", theirs),
        }
    }

    /// Lock errors a reader may degrade from instead of aborting.
    pub fn is_access(&self) -> bool {
        matches!(self, DbError::Access { .. })
    }

    /// Convert to a user-facing diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());
        match self {
            DbError::Locked { .. } => diag
                .with_suggestion("Retry with a lock timeout, e.g. `--lock-timeout 10`")
                .with_suggestion("Remove the lock marker if its holder process is gone"),
            DbError::Access { .. } => {
                diag.with_context("reading is still possible without a lock")
            }
            DbError::MergeConflict { .. } => diag.with_suggestion(
                "Edit one of the databases so both agree on the value",
            ),
            DbError::NotFound(_) => diag.with_suggestion(suggestions::LIST_MODULES),
            DbError::Spec(_) => diag.with_suggestion(suggestions::SPEC_SYNTAX),
            DbError::ReadOnly { owner, .. } => diag.with_location(owner.clone()),
            DbError::Parse { .. } | DbError::Invalid { .. } => {
                diag.with_suggestion(suggestions::RESTORE_BACKUP)
            }
            _ => diag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_message_names_holder() {
        let err = DbError::Locked {
            path: PathBuf::from("/db/DEPS.DB"),
            holder: "alice@host:42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "file '/db/DEPS.DB' is locked: alice@host:42"
        );
        let output = err.to_diagnostic().to_string();
        assert!(output.contains("--lock-timeout"));
    }

    #[test]
    fn test_conflict_formats_both_sides() {
        let err = DbError::conflict("module A version R1 dependencies", ["B"], ["C"]);
        let text = err.to_string();
        assert!(text.contains("[\"B\"]"));
        assert!(text.contains("[\"C\"]"));
    }
}
