//! The bibliography container
//!
//! A [`Bibliography`] owns an ordered list of entries plus the `@preamble`
//! and `@string` records of its file. A key index is derived from the list and
//! rebuilt after every mutation, so lookups stay O(1) without the two ever
//! disagreeing.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bibsmith_bibtex::{
    format_complete, is_valid_key, parse_strict, BibTeXEntry, BibTeXField, ParseError,
};
use serde::Serialize;

use crate::collision::{disambiguate, AddOutcome, CollisionPolicy, Resolution};
use crate::error::{BibError, Result};
use crate::options::OptionsRecord;
use crate::persist::write_atomic;

/// A key that appears more than once in a loaded file
///
/// Loading keeps every occurrence; lookups by key return the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateKeyWarning {
    pub key: String,
    /// Position of the extra occurrence in the entry list
    pub position: usize,
}

impl fmt::Display for DuplicateKeyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate key \"{}\" (entry #{}); lookups use the first occurrence",
            self.key,
            self.position + 1
        )
    }
}

/// A bibliography read from disk, with the warnings raised while reading it
#[derive(Debug, Clone)]
pub struct Loaded {
    pub bibliography: Bibliography,
    pub warnings: Vec<DuplicateKeyWarning>,
}

/// An ordered collection of BibTeX entries
#[derive(Debug, Clone, Default)]
pub struct Bibliography {
    entries: Vec<BibTeXEntry>,
    index: HashMap<String, usize>,
    preambles: Vec<String>,
    strings: Vec<(String, String)>,
    origin: Option<PathBuf>,
    options: Option<OptionsRecord>,
}

impl Bibliography {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a container from entries, keeping duplicate keys
    pub fn from_entries(entries: Vec<BibTeXEntry>) -> (Self, Vec<DuplicateKeyWarning>) {
        let mut bibliography = Self {
            entries,
            ..Self::default()
        };
        let warnings = bibliography.reindex();
        (bibliography, warnings)
    }

    /// Read and parse a bibliography file
    ///
    /// Any syntax error is fatal and reported with its line.
    pub fn load(path: &Path) -> Result<Loaded> {
        let text = fs::read_to_string(path).map_err(|e| BibError::io(path, e))?;
        let loaded = Self::parse_str(&text, Some(path))?;
        tracing::info!(
            "Loaded {} entries from {}",
            loaded.bibliography.len(),
            path.display()
        );
        for warning in &loaded.warnings {
            tracing::warn!("{}: {}", path.display(), warning);
        }
        Ok(loaded)
    }

    /// Like [`Bibliography::load`], but a missing file yields an empty container
    pub fn load_or_default(path: &Path) -> Result<Loaded> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::info!("{} does not exist yet, starting empty", path.display());
        let bibliography = Self {
            origin: Some(path.to_path_buf()),
            ..Self::default()
        };
        Ok(Loaded {
            bibliography,
            warnings: Vec::new(),
        })
    }

    /// Parse bibliography text; `origin` is used in error messages
    pub fn parse_str(text: &str, origin: Option<&Path>) -> Result<Loaded> {
        let parsed = parse_strict(text).map_err(|e| {
            let path = origin
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<input>".to_string());
            match e {
                ParseError::InvalidSyntax(err) => BibError::Parse {
                    path,
                    line: err.line,
                    column: err.column,
                    message: err.message,
                },
                ParseError::NoEntry => BibError::Parse {
                    path,
                    line: 1,
                    column: 1,
                    message: "no record found".to_string(),
                },
            }
        })?;

        let options = OptionsRecord::from_header(text);
        let (mut bibliography, warnings) = Self::from_entries(parsed.entries);
        bibliography.preambles = parsed.preambles;
        bibliography.strings = parsed.strings;
        bibliography.origin = origin.map(Path::to_path_buf);
        bibliography.options = (!options.is_empty()).then_some(options);

        Ok(Loaded {
            bibliography,
            warnings,
        })
    }

    /// Serialize to BibTeX: options header, preambles, strings, entries
    pub fn to_bibtex(&self) -> String {
        let body = format_complete(&self.preambles, &self.strings, &self.entries);
        match self.options.as_ref().filter(|o| !o.is_empty()) {
            Some(options) => format!("{}\n{}", options.to_header(), body),
            None => body,
        }
    }

    /// Write the bibliography to `path`, replacing it atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bibtex())?;
        tracing::info!("Saved {} entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Add an entry, consulting `policy` if the key is taken
    pub fn add(&mut self, entry: BibTeXEntry, policy: &mut CollisionPolicy) -> Result<AddOutcome> {
        self.add_avoiding(entry, policy, &HashSet::new())
    }

    /// [`Bibliography::add`], never renaming onto a key in `reserved`
    pub fn add_avoiding(
        &mut self,
        mut entry: BibTeXEntry,
        policy: &mut CollisionPolicy,
        reserved: &HashSet<String>,
    ) -> Result<AddOutcome> {
        if !entry.is_valid() {
            return Err(BibError::InvalidEntry(format!(
                "entry \"{}\" needs a key and a type",
                entry.cite_key
            )));
        }

        let Some(&position) = self.index.get(&entry.cite_key) else {
            let key = entry.cite_key.clone();
            self.push(entry);
            return Ok(AddOutcome::Inserted { key });
        };

        let from = entry.cite_key.clone();
        let resolution = policy.decide(&self.entries[position], &entry);
        tracing::debug!("Key collision on {}: {:?}", from, resolution);

        match resolution {
            Resolution::Reject => Err(BibError::KeyCollision { key: from }),
            Resolution::Abort => Err(BibError::Aborted { key: from }),
            Resolution::Replace => {
                self.entries[position] = entry;
                Ok(AddOutcome::Replaced { key: from })
            }
            Resolution::Rename => {
                let to = self.free_key(&from, reserved);
                entry.cite_key = to.clone();
                self.push(entry);
                Ok(AddOutcome::Renamed { from, to })
            }
            Resolution::RenameTo(requested) => {
                let requested = requested.trim();
                check_new_key(&from, requested)?;
                let to = if self.is_taken(requested, reserved) {
                    self.free_key(requested, reserved)
                } else {
                    requested.to_string()
                };
                entry.cite_key = to.clone();
                self.push(entry);
                Ok(AddOutcome::Renamed { from, to })
            }
        }
    }

    /// Remove every entry stored under `key`; false when there was none
    pub fn remove(&mut self, key: &str) -> bool {
        if !self.index.contains_key(key) {
            return false;
        }
        self.entries.retain(|e| e.cite_key != key);
        self.reindex();
        true
    }

    /// Store the entry under `old` as `new`
    pub fn rekey(&mut self, old: &str, new: &str) -> Result<()> {
        let new = new.trim();
        check_new_key(old, new)?;
        if self.index.contains_key(new) {
            return Err(BibError::KeyCollision {
                key: new.to_string(),
            });
        }
        let position = *self
            .index
            .get(old)
            .ok_or_else(|| BibError::InvalidEntry(format!("no entry with key \"{old}\"")))?;
        self.entries[position].cite_key = new.to_string();
        self.reindex();
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&BibTeXEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn entries(&self) -> &[BibTeXEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BibTeXEntry> {
        self.entries.iter()
    }

    /// Keys in entry order; a duplicated key is listed once per occurrence
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.cite_key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the entries for which `keep` returns true
    pub fn retain(&mut self, keep: impl FnMut(&BibTeXEntry) -> bool) {
        self.entries.retain(keep);
        self.reindex();
    }

    /// Edit entry fields in place; keys stay read-only
    pub fn entries_mut_with(&mut self, mut edit: impl FnMut(&str, &mut Vec<BibTeXField>)) {
        for entry in &mut self.entries {
            edit(&entry.cite_key, &mut entry.fields);
        }
    }

    pub fn preambles(&self) -> &[String] {
        &self.preambles
    }

    pub fn strings(&self) -> &[(String, String)] {
        &self.strings
    }

    /// Define a `@string` macro unless one with that name exists
    pub fn define_string(&mut self, name: &str, value: &str) -> bool {
        if self.strings.iter().any(|(n, _)| n.eq_ignore_ascii_case(name)) {
            return false;
        }
        self.strings.push((name.to_string(), value.to_string()));
        true
    }

    /// Add a `@preamble` unless an identical one exists
    pub fn add_preamble(&mut self, text: &str) -> bool {
        if self.preambles.iter().any(|p| p == text) {
            return false;
        }
        self.preambles.push(text.to_string());
        true
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn set_origin(&mut self, origin: impl Into<PathBuf>) {
        self.origin = Some(origin.into());
    }

    /// File name of the origin, for messages
    pub fn name(&self) -> String {
        self.origin
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<unsaved>".to_string())
    }

    pub fn options(&self) -> Option<&OptionsRecord> {
        self.options.as_ref()
    }

    pub fn set_options(&mut self, options: Option<OptionsRecord>) {
        self.options = options;
    }

    fn push(&mut self, entry: BibTeXEntry) {
        self.index
            .entry(entry.cite_key.clone())
            .or_insert(self.entries.len());
        self.entries.push(entry);
    }

    fn is_taken(&self, key: &str, reserved: &HashSet<String>) -> bool {
        self.index.contains_key(key) || reserved.contains(key)
    }

    fn free_key(&self, base: &str, reserved: &HashSet<String>) -> String {
        disambiguate(base, |candidate| self.is_taken(candidate, reserved))
    }

    fn reindex(&mut self) -> Vec<DuplicateKeyWarning> {
        self.index.clear();
        let mut warnings = Vec::new();
        for (position, entry) in self.entries.iter().enumerate() {
            if self.index.contains_key(&entry.cite_key) {
                warnings.push(DuplicateKeyWarning {
                    key: entry.cite_key.clone(),
                    position,
                });
            } else {
                self.index.insert(entry.cite_key.clone(), position);
            }
        }
        warnings
    }
}

/// A replacement key must survive a save and reload
fn check_new_key(old: &str, new: &str) -> Result<()> {
    if is_valid_key(new) {
        return Ok(());
    }
    Err(BibError::InvalidEntry(format!(
        "\"{new}\" is not a usable key for \"{old}\""
    )))
}

impl<'a> IntoIterator for &'a Bibliography {
    type Item = &'a BibTeXEntry;
    type IntoIter = std::slice::Iter<'a, BibTeXEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibsmith_bibtex::BibTeXEntryType;

    fn entry(key: &str, title: &str) -> BibTeXEntry {
        BibTeXEntry::new(key, BibTeXEntryType::Article).with_field("title", title)
    }

    fn bib(entries: Vec<BibTeXEntry>) -> Bibliography {
        Bibliography::from_entries(entries).0
    }

    #[test]
    fn test_add_inserts_free_key() {
        let mut b = Bibliography::new();
        let outcome = b
            .add(entry("smith2020", "A"), &mut CollisionPolicy::Reject)
            .unwrap();
        assert_eq!(outcome, AddOutcome::Inserted { key: "smith2020".into() });
        assert_eq!(b.get("smith2020").and_then(|e| e.title()), Some("A"));
    }

    #[test]
    fn test_reject_leaves_container_unchanged() {
        let mut b = bib(vec![entry("k", "old")]);
        let err = b.add(entry("k", "new"), &mut CollisionPolicy::Reject).unwrap_err();
        assert!(matches!(err, BibError::KeyCollision { ref key } if key == "k"));
        assert_eq!(b.len(), 1);
        assert_eq!(b.get("k").and_then(|e| e.title()), Some("old"));
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut b = bib(vec![entry("a", "1"), entry("k", "old"), entry("z", "2")]);
        let outcome = b.add(entry("k", "new"), &mut CollisionPolicy::Replace).unwrap();
        assert_eq!(outcome, AddOutcome::Replaced { key: "k".into() });
        assert_eq!(b.keys().collect::<Vec<_>>(), vec!["a", "k", "z"]);
        assert_eq!(b.get("k").and_then(|e| e.title()), Some("new"));
    }

    #[test]
    fn test_rename_appends_suffixes() {
        let mut b = bib(vec![entry("smith2020", "A")]);
        let mut policy = CollisionPolicy::Rename;
        let first = b.add(entry("smith2020", "B"), &mut policy).unwrap();
        let second = b.add(entry("smith2020", "C"), &mut policy).unwrap();
        assert_eq!(first.key(), "smith2020a");
        assert_eq!(second.key(), "smith2020b");
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn test_rename_avoids_reserved_keys() {
        let mut b = bib(vec![entry("k", "A")]);
        let reserved: HashSet<String> = ["ka".to_string()].into();
        let outcome = b
            .add_avoiding(entry("k", "B"), &mut CollisionPolicy::Rename, &reserved)
            .unwrap();
        assert_eq!(outcome.key(), "kb");
    }

    #[test]
    fn test_ask_rename_to_and_abort() {
        let mut b = bib(vec![entry("k", "A"), entry("mine", "M")]);
        let mut policy = CollisionPolicy::ask(|_: &BibTeXEntry, _: &BibTeXEntry| {
            Resolution::RenameTo("mine".to_string())
        });
        let outcome = b.add(entry("k", "B"), &mut policy).unwrap();
        assert_eq!(
            outcome,
            AddOutcome::Renamed { from: "k".into(), to: "minea".into() }
        );

        let mut abort = CollisionPolicy::ask(|_: &BibTeXEntry, _: &BibTeXEntry| Resolution::Abort);
        let err = b.add(entry("k", "C"), &mut abort).unwrap_err();
        assert!(matches!(err, BibError::Aborted { .. }));
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn test_add_rejects_invalid_entry() {
        let mut b = Bibliography::new();
        let err = b
            .add(BibTeXEntry::new("", BibTeXEntryType::Misc), &mut CollisionPolicy::Rename)
            .unwrap_err();
        assert!(matches!(err, BibError::InvalidEntry(_)));
        assert!(b.is_empty());
    }

    #[test]
    fn test_add_rejects_unreadable_key() {
        let mut b = Bibliography::new();
        for key in ["smith 2020", "a,b", "x{y}"] {
            let err = b
                .add(BibTeXEntry::new(key, BibTeXEntryType::Misc), &mut CollisionPolicy::Rename)
                .unwrap_err();
            assert!(matches!(err, BibError::InvalidEntry(_)), "{key}");
        }
        assert!(b.is_empty());
    }

    #[test]
    fn test_rename_to_unreadable_key_is_refused() {
        let mut b = bib(vec![entry("k", "A")]);
        let mut policy = CollisionPolicy::ask(|_: &BibTeXEntry, _: &BibTeXEntry| {
            Resolution::RenameTo("smith 2020".to_string())
        });
        let err = b.add(entry("k", "B"), &mut policy).unwrap_err();
        assert!(matches!(err, BibError::InvalidEntry(_)));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_renamed_entry_survives_reload() {
        let mut b = bib(vec![entry("k", "A")]);
        let mut policy = CollisionPolicy::ask(|_: &BibTeXEntry, _: &BibTeXEntry| {
            Resolution::RenameTo("smith:2020/b".to_string())
        });
        b.add(entry("k", "B"), &mut policy).unwrap();

        let reloaded = Bibliography::parse_str(&b.to_bibtex(), None).unwrap().bibliography;
        assert_eq!(reloaded.keys().collect::<Vec<_>>(), vec!["k", "smith:2020/b"]);
    }

    #[test]
    fn test_remove() {
        let mut b = bib(vec![entry("a", "1"), entry("b", "2")]);
        assert!(b.remove("a"));
        assert!(!b.remove("a"));
        assert!(!b.contains_key("a"));
        assert_eq!(b.get("b").and_then(|e| e.title()), Some("2"));
    }

    #[test]
    fn test_duplicates_kept_and_reported() {
        let (b, warnings) = Bibliography::from_entries(vec![
            entry("k", "first"),
            entry("x", "other"),
            entry("k", "second"),
        ]);
        assert_eq!(b.len(), 3);
        assert_eq!(warnings, vec![DuplicateKeyWarning { key: "k".into(), position: 2 }]);
        assert_eq!(b.get("k").and_then(|e| e.title()), Some("first"));
    }

    #[test]
    fn test_rekey() {
        let mut b = bib(vec![entry("a", "1"), entry("b", "2")]);
        assert!(matches!(b.rekey("a", "b"), Err(BibError::KeyCollision { .. })));
        assert!(matches!(b.rekey("a", "c d"), Err(BibError::InvalidEntry(_))));
        b.rekey("a", "c").unwrap();
        assert_eq!(b.keys().collect::<Vec<_>>(), vec!["c", "b"]);
        assert!(b.get("a").is_none());
    }

    #[test]
    fn test_entries_mut_with_edits_fields() {
        let mut b = bib(vec![entry("a", "1")]);
        b.entries_mut_with(|_, fields| {
            fields.push(BibTeXField { key: "note".into(), value: "n".into() })
        });
        assert_eq!(b.get("a").and_then(|e| e.get_field("note")), Some("n"));
    }

    #[test]
    fn test_parse_error_is_fatal() {
        let err = Bibliography::parse_str("@article{a,\n title = {x},\n", Some(Path::new("x.bib")))
            .unwrap_err();
        match err {
            BibError::Parse { path, message, .. } => {
                assert_eq!(path, "x.bib");
                assert!(message.ends_with("record starting at line 1"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_options_round_trip_through_text() {
        let mut b = bib(vec![entry("a", "1")]);
        b.set_options(Some(OptionsRecord::new().with("PDF_DIR", "/papers")));
        let text = b.to_bibtex();
        assert!(text.starts_with("%BIBSMITH_PDF_DIR=/papers\n\n@article{a,"));

        let loaded = Bibliography::parse_str(&text, None).unwrap().bibliography;
        assert_eq!(loaded.options().and_then(|o| o.get("PDF_DIR")), Some("/papers"));
        assert_eq!(loaded.entries(), b.entries());
    }
}
