//! Test fixture loading utilities

use std::path::{Path, PathBuf};

use bibsmith_core::{BibTeXEntry, BibTeXEntryType, Bibliography};

/// Get the path to a fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_fixtures")
        .join(name)
}

/// Load a fixture file as a string
#[allow(dead_code)]
pub fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", name))
}

/// Load a BibTeX fixture as a bibliography
#[allow(dead_code)]
pub fn load_bibliography(name: &str) -> Bibliography {
    Bibliography::load(&fixture_path(&format!("bibtex/{}", name)))
        .unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
        .bibliography
}

/// Copy a fixture into `dir`, returning the new path
#[allow(dead_code)]
pub fn copy_fixture(name: &str, dir: &Path) -> PathBuf {
    let source = fixture_path(name);
    let target = dir.join(source.file_name().unwrap());
    std::fs::copy(&source, &target).unwrap();
    target
}

/// An article with the default core fields set
#[allow(dead_code)]
pub fn article(key: &str, author: &str, title: &str, year: &str) -> BibTeXEntry {
    BibTeXEntry::new(key, BibTeXEntryType::Article)
        .with_field("author", author)
        .with_field("title", title)
        .with_field("year", year)
}

/// A bibliography named `name` holding `entries`
#[allow(dead_code)]
pub fn bibliography(name: &str, entries: Vec<BibTeXEntry>) -> Bibliography {
    let (mut bib, warnings) = Bibliography::from_entries(entries);
    assert!(warnings.is_empty(), "fixture has duplicate keys: {warnings:?}");
    bib.set_origin(name);
    bib
}
