//! The options record remembered between build runs
//!
//! A build stores the flags it ran with at the top of the bibliography as
//! comment lines:
//!
//! ```text
//! %BIBSMITH_PDF_DIR=/home/me/papers
//! %BIBSMITH_NO_DUP=true
//! ```
//!
//! BibTeX ignores `%` lines outside records, so the file stays valid. The
//! next run reads them back so the flags need not be repeated.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

/// Prefix of every options header line
pub const HEADER_PREFIX: &str = "%BIBSMITH_";

/// Prefix of the environment variables consulted after the record
pub const ENV_PREFIX: &str = "BIBSMITH_";

/// Option names written by the build command
pub mod names {
    pub const PDF_DIR: &str = "PDF_DIR";
    pub const NO_DUP: &str = "NO_DUP";
    pub const ABBREVIATE_JOURNALS: &str = "ABBREVIATE_JOURNALS";
}

/// Immutable name → value map of build flags
///
/// Updating returns a new record; the one read at the start of a run stays
/// as it was until the run replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptionsRecord {
    values: BTreeMap<String, String>,
}

impl OptionsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this record with `name` set to `value`
    pub fn with(&self, name: &str, value: impl ToString) -> Self {
        let mut values = self.values.clone();
        let value = value.to_string().replace(['\r', '\n'], " ");
        values.insert(name.to_uppercase(), value);
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_uppercase()).map(String::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(parse_bool)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Read the record from the header lines of a bibliography file
    ///
    /// Only lines before the first record are considered.
    pub fn from_header(text: &str) -> Self {
        let values = text
            .lines()
            .take_while(|line| !line.trim_start().starts_with('@'))
            .filter_map(|line| line.trim().strip_prefix(HEADER_PREFIX))
            .filter_map(|rest| rest.split_once('='))
            .map(|(name, value)| (name.trim().to_uppercase(), value.trim().to_string()))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        Self { values }
    }

    /// Header lines for this record, one per option, each ending in a newline
    pub fn to_header(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| format!("{HEADER_PREFIX}{name}={value}\n"))
            .collect()
    }
}

/// Parse the boolean spellings accepted in headers and the environment
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Resolve an option: command line, then the record, then the environment
///
/// Returns `None` when no source provides a parseable value; the caller
/// applies its default.
pub fn resolve<T>(
    arg: Option<T>,
    record: &OptionsRecord,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    resolve_with_env(arg, record, name, |var| std::env::var(var).ok(), parse)
}

/// [`resolve`] with an injectable environment lookup
pub fn resolve_with_env<T>(
    arg: Option<T>,
    record: &OptionsRecord,
    name: &str,
    env: impl Fn(&str) -> Option<String>,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    if arg.is_some() {
        return arg;
    }
    if let Some(value) = record.get(name).and_then(&parse) {
        return Some(value);
    }
    env(&format!("{ENV_PREFIX}{}", name.to_uppercase())).and_then(|value| parse(&value))
}

/// Rewrite a path under another user's home directory to live under `home`
///
/// Bibliographies move between machines; a `file` field recorded as
/// `/home/alice/papers/x.pdf` becomes `<home>/papers/x.pdf`. Paths outside a
/// home directory are returned unchanged.
pub fn rebase_home(path: &str, home: &Path) -> String {
    let home = home.to_string_lossy();
    let home = home.trim_end_matches('/');
    if path == home || path.starts_with(&format!("{home}/")) {
        return path.to_string();
    }
    for root in ["/home/", "/Users/"] {
        if let Some(rest) = path.strip_prefix(root) {
            if let Some((_user, tail)) = rest.split_once('/') {
                return format!("{home}/{tail}");
            }
        }
    }
    path.to_string()
}
