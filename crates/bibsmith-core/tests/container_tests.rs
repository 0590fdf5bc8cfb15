//! Bibliography container integration tests

mod common;

use std::fs;
use std::io::Write;

use bibsmith_core::persist::{backup_path, write_atomic_with};
use bibsmith_core::{
    BibError, BibTeXEntry, BibTeXEntryType, Bibliography, CollisionPolicy, OptionsRecord,
};
use common::fixtures::{copy_fixture, fixture_path, load_bibliography};
use tempfile::tempdir;

fn field_values(bib: &Bibliography) -> Vec<(String, Vec<(String, String)>)> {
    bib.iter()
        .map(|e| {
            (
                e.cite_key.clone(),
                e.fields
                    .iter()
                    .map(|f| (f.key.clone(), f.value.clone()))
                    .collect(),
            )
        })
        .collect()
}

// === Load / save ===

#[test]
fn test_load_fixture() {
    let bib = load_bibliography("primary.bib");
    assert_eq!(bib.len(), 3);
    assert_eq!(bib.keys().collect::<Vec<_>>(), vec!["smith2020", "laughner2019", "dataset2021"]);
    // @string macros are expanded on load
    assert_eq!(
        bib.get("smith2020").and_then(|e| e.journal()),
        Some("Geophysical Research Letters")
    );
    assert_eq!(
        bib.options().and_then(|o| o.get("PDF_DIR")),
        Some("/home/alice/papers")
    );
}

#[test]
fn test_save_load_round_trip() {
    let dir = tempdir().unwrap();
    let original = load_bibliography("primary.bib");

    let first = dir.path().join("first.bib");
    original.save(&first).unwrap();
    let reloaded = Bibliography::load(&first).unwrap().bibliography;

    assert_eq!(field_values(&reloaded), field_values(&original));
    assert_eq!(reloaded.options(), original.options());

    // A second cycle produces the same bytes
    let second = dir.path().join("second.bib");
    reloaded.save(&second).unwrap();
    assert_eq!(
        fs::read_to_string(&first).unwrap(),
        fs::read_to_string(&second).unwrap()
    );
}

#[test]
fn test_round_trip_preserves_field_order_and_unknown_types() {
    let text = "@patent{tool,\n    zeta = {last field first},\n    alpha = {1.0},\n    year = 1999,\n}\n";
    let bib = Bibliography::parse_str(text, None).unwrap().bibliography;
    assert_eq!(bib.to_bibtex(), text);
}

#[test]
fn test_duplicate_keys_on_load_are_warnings() {
    let text = "@misc{k, title = {First}}\n@misc{k, title = {Second}}\n";
    let loaded = Bibliography::parse_str(text, None).unwrap();
    assert_eq!(loaded.bibliography.len(), 2);
    assert_eq!(loaded.warnings.len(), 1);
    assert_eq!(loaded.warnings[0].key, "k");
    assert_eq!(
        loaded.bibliography.get("k").and_then(|e| e.title()),
        Some("First")
    );
}

#[test]
fn test_parse_error_names_file_and_line() {
    let err = Bibliography::load(&fixture_path("bibtex/broken.bib")).unwrap_err();
    match err {
        BibError::Parse { path, message, .. } => {
            assert!(path.ends_with("broken.bib"));
            assert!(message.contains("line 5"), "{message}");
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn test_load_or_default_missing_file() {
    let dir = tempdir().unwrap();
    let loaded = Bibliography::load_or_default(&dir.path().join("new.bib")).unwrap();
    assert!(loaded.bibliography.is_empty());
    assert_eq!(loaded.bibliography.name(), "new.bib");
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let err = Bibliography::load(&dir.path().join("absent.bib")).unwrap_err();
    assert!(matches!(err, BibError::Io { .. }));
}

// === Options record ===

#[test]
fn test_options_record_replaced_not_mutated() {
    let dir = tempdir().unwrap();
    let path = copy_fixture("bibtex/primary.bib", dir.path());
    let mut bib = Bibliography::load(&path).unwrap().bibliography;

    let before = bib.options().cloned().unwrap();
    let after = before.with("PDF_DIR", "/home/bob/papers");
    bib.set_options(Some(after));
    bib.save(&path).unwrap();

    assert_eq!(before.get("PDF_DIR"), Some("/home/alice/papers"));
    let reloaded = Bibliography::load(&path).unwrap().bibliography;
    assert_eq!(reloaded.options().and_then(|o| o.get("PDF_DIR")), Some("/home/bob/papers"));
    assert_eq!(reloaded.options().and_then(|o| o.get_bool("NO_DUP")), Some(true));
}

#[test]
fn test_clearing_options_removes_header() {
    let mut bib = load_bibliography("primary.bib");
    bib.set_options(None);
    assert!(!bib.to_bibtex().contains("%BIBSMITH_"));

    bib.set_options(Some(OptionsRecord::new()));
    assert!(bib.to_bibtex().starts_with("@string"));
}

// === Crash safety ===

#[test]
fn test_failed_write_leaves_original_byte_identical() {
    let dir = tempdir().unwrap();
    let path = copy_fixture("bibtex/primary.bib", dir.path());
    let before = fs::read(&path).unwrap();

    let mut bib = Bibliography::load(&path).unwrap().bibliography;
    bib.add(
        BibTeXEntry::new("new2024", BibTeXEntryType::Misc).with_field("title", "New"),
        &mut CollisionPolicy::Reject,
    )
    .unwrap();
    let text = bib.to_bibtex();

    // Interrupted after writing part of the new contents
    let result = write_atomic_with(&path, |file| {
        file.write_all(&text.as_bytes()[..text.len() / 2])?;
        Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "killed"))
    });

    assert!(matches!(result, Err(BibError::Write { .. })));
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(!backup_path(&path).exists());
}

#[test]
fn test_save_into_missing_directory_fails_cleanly() {
    let dir = tempdir().unwrap();
    let bib = load_bibliography("primary.bib");
    let err = bib.save(&dir.path().join("no/such/dir/out.bib")).unwrap_err();
    assert!(matches!(err, BibError::Write { .. }));
}
