//! Configuration for bibsmith
//!
//! Optional defaults read from `config.toml` in the user's configuration
//! directory. Every field has a default, so the file may set only what it
//! changes. Command line flags override the file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::collision::Resolution;
use crate::error::{BibError, Result};
use crate::lookup::DEFAULT_USER_AGENT;
use crate::model::{ContentRule, DEFAULT_CORE_FIELDS};
use crate::render::{RenderOptions, YearHeader};

/// All settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BibsmithConfig {
    pub content: ContentConfig,
    pub build: BuildConfig,
    pub render: RenderConfig,
    pub merge: MergeConfig,
}

/// How entries are compared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Fields that decide whether two entries are the same record
    pub core_fields: Vec<String>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            core_fields: DEFAULT_CORE_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Defaults for `bibsmith build`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Resolver queried for BibTeX records
    pub resolver: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub backup: bool,
    pub log_file: bool,
    pub abbreviate_journals: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            resolver: crate::lookup::DEFAULT_RESOLVER.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_seconds: 30,
            backup: true,
            log_file: true,
            abbreviate_journals: false,
        }
    }
}

/// Defaults for `bibsmith render-web`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub bold_authors: Vec<String>,
    pub entry_types: Vec<String>,
    pub promote_bold_first_author: bool,
    /// `std`, `bootstrap` or a template containing `{}`
    pub year_header: String,
    pub backup: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            bold_authors: Vec::new(),
            entry_types: Vec::new(),
            promote_bold_first_author: false,
            year_header: "std".to_string(),
            backup: true,
        }
    }
}

impl RenderConfig {
    pub fn to_options(&self) -> RenderOptions {
        RenderOptions {
            bold_authors: self.bold_authors.clone(),
            entry_types: self.entry_types.clone(),
            promote_bold_first_author: self.promote_bold_first_author,
            year_header: YearHeader::parse(&self.year_header),
        }
    }
}

/// How `bibsmith merge` resolves key collisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    /// Ask on the terminal
    #[default]
    Ask,
    /// Keep the entry merged first
    First,
    /// Keep the entry merged last
    Last,
    /// Keep both, renaming the later one
    Rename,
    /// Stop at the first collision
    Error,
}

impl ConflictMode {
    /// The fixed resolution for non-interactive modes
    pub fn resolution(self) -> Option<Resolution> {
        match self {
            ConflictMode::Ask => None,
            ConflictMode::First | ConflictMode::Error => Some(Resolution::Reject),
            ConflictMode::Last => Some(Resolution::Replace),
            ConflictMode::Rename => Some(Resolution::Rename),
        }
    }
}

impl FromStr for ConflictMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ask" => Ok(ConflictMode::Ask),
            "first" => Ok(ConflictMode::First),
            "last" => Ok(ConflictMode::Last),
            "rename" => Ok(ConflictMode::Rename),
            "error" => Ok(ConflictMode::Error),
            other => Err(format!(
                "unknown conflict mode \"{other}\" (expected ask, first, last, rename or error)"
            )),
        }
    }
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictMode::Ask => "ask",
            ConflictMode::First => "first",
            ConflictMode::Last => "last",
            ConflictMode::Rename => "rename",
            ConflictMode::Error => "error",
        };
        f.write_str(name)
    }
}

/// Defaults for `bibsmith merge`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub output: PathBuf,
    pub conflict_mode: ConflictMode,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("merged.bib"),
            conflict_mode: ConflictMode::Ask,
        }
    }
}

impl BibsmithConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| BibError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BibError::Config(e.to_string()))
    }

    /// `<config dir>/bibsmith/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bibsmith").join("config.toml"))
    }

    /// Load from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| BibError::io(path, e))?;
        Self::from_toml(&text).map_err(|e| match e {
            BibError::Config(message) => {
                BibError::Config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn content_rule(&self) -> ContentRule {
        ContentRule::new(&self.content.core_fields)
    }

    pub fn validate(&self) -> Result<()> {
        if self.content_rule().core_fields().is_empty() {
            return Err(BibError::Config(
                "content.core_fields must name at least one field".to_string(),
            ));
        }
        if self.build.timeout_seconds == 0 {
            return Err(BibError::Config(
                "build.timeout_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
