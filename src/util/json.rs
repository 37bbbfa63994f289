//! Deterministic JSON encoding shared by the databases and config files.
//!
//! Output has sorted object keys, a four space indent, no trailing
//! whitespace on any line and a final newline, so that saved files diff
//! cleanly and `save(load(x)) == x` holds byte for byte.

use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::util::errors::{DbError, DbResult};

/// Pseudo path meaning "read from stdin".
pub const STDIN_PATH: &str = "-";

/// Serialize `value` into the canonical on-disk text.
pub fn to_string_sorted<T: Serialize + ?Sized>(value: &T) -> DbResult<String> {
    // Going through `Value` sorts the keys: its map is ordered.
    let value = serde_json::to_value(value).map_err(|e| DbError::Invalid {
        kind: "json",
        message: e.to_string(),
        origin: String::new(),
    })?;

    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser).map_err(|e| DbError::Invalid {
        kind: "json",
        message: e.to_string(),
        origin: String::new(),
    })?;

    let text = String::from_utf8_lossy(&buf);
    let mut out = String::with_capacity(text.len() + 1);
    for line in text.lines() {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    Ok(out)
}

/// Parse `text` into `T`.
///
/// Syntax errors become [`DbError::Parse`]; well-formed JSON with the wrong
/// shape becomes [`DbError::Invalid`] tagged with `kind`.
pub fn from_str<T: DeserializeOwned>(text: &str, kind: &'static str, origin: &str) -> DbResult<T> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| DbError::Parse {
        origin: origin.to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| DbError::Invalid {
        kind,
        message: e.to_string(),
        origin: origin.to_string(),
    })
}

/// Read a whole file, or stdin when `path` is `-`.
pub fn read_text(path: &Path) -> DbResult<String> {
    if path.as_os_str() == STDIN_PATH {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| DbError::io("read", "<stdin>", e))?;
        return Ok(text);
    }
    std::fs::read_to_string(path).map_err(|e| DbError::io("read", path, e))
}

/// Read and parse a JSON file (or stdin).
pub fn load_file<T: DeserializeOwned>(path: &Path, kind: &'static str) -> DbResult<T> {
    let text = read_text(path)?;
    from_str(&text, kind, &format!("file {}", path.display()))
}
