//! User-facing diagnostic messages.
//!
//! Every error printed by the binary goes through [`Diagnostic`], so that
//! the root cause, the surrounding context and a suggested fix are shown
//! in a consistent layout.

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when a module or version is unknown.
    pub const LIST_MODULES: &str = "Run `drydock db modules` to see known modules";

    /// Suggestion when a module spec cannot be parsed.
    pub const SPEC_SYNTAX: &str =
        "Module specs look like MODULE, MODULE:VERSION, MODULE:+VERSION or MODULE:-VERSION";

    /// Suggestion when a database file is damaged.
    pub const RESTORE_BACKUP: &str = "The previous contents were saved as <file>.bak";

    /// Suggestion when a build tag is unknown.
    pub const LIST_BUILDS: &str = "Run `drydock build list` to see known builds";
}

/// An error message with the context it arose in and ways to fix it.
#[derive(Debug, Clone, Default)]
pub struct Diagnostic {
    pub message: String,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Database or overlay file the message is about
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: normalize_message(&message.into()),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;
        if let Some(path) = &self.location {
            writeln!(f, "  --> {}", path.display())?;
        }
        for line in &self.context {
            writeln!(f, "  = {}", line)?;
        }
        for (i, suggestion) in self.suggestions.iter().enumerate() {
            let label = if i == 0 { "help:" } else { "     " };
            writeln!(f, "  {} {}", label, suggestion)?;
        }
        Ok(())
    }
}

static ERROR_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(Error|error|Err|err)[:, ] *").ok());

/// Strip a leading "Error:"-style prefix so messages are not doubled
/// when the binary prints them behind its own `error:` label.
pub fn normalize_message(message: &str) -> String {
    match ERROR_PREFIX.as_ref() {
        Some(re) => re.replace(message, "").into_owned(),
        None => message.to_string(),
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic) {
    eprint!("{}", diagnostic);
}
