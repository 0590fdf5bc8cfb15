//! Error types shared by the bibliography tools

use std::path::PathBuf;

use thiserror::Error;

/// A specialized Result type for bibliography operations.
pub type Result<T> = std::result::Result<T, BibError>;

/// Errors raised while loading, changing or writing bibliographies.
///
/// `Extraction`, `Lookup` and `KeyCollision` concern a single entry and are
/// recoverable: drivers count them and keep going. Everything else aborts
/// the run before the destination file is replaced.
#[derive(Error, Debug)]
pub enum BibError {
    #[error("Parse error in {path}: {line}:{column}: {message}")]
    Parse {
        path: String,
        line: u32,
        column: u32,
        message: String,
    },

    #[error("Key collision: an entry with key \"{key}\" already exists")]
    KeyCollision { key: String },

    #[error("Could not extract an identifier from {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("Lookup failed for {identifier}: {message}")]
    Lookup { identifier: String, message: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Aborted while resolving key \"{key}\"")]
    Aborted { key: String },
}

impl BibError {
    /// Whether the error concerns one candidate only and the run can continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BibError::Extraction { .. } | BibError::Lookup { .. } | BibError::KeyCollision { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BibError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BibError::Write {
            path: path.into(),
            source,
        }
    }
}
