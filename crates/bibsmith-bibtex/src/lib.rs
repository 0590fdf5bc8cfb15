//! BibTeX parsing and formatting
//!
//! This crate provides the BibTeX parser and formatter used by bibsmith. A
//! file that parses cleanly formats back to the same records, fields and
//! field order.
//!
//! Features:
//! - Nom-based parser with error recovery and a strict mode
//! - Round-trip formatting, including @string and @preamble
//! - Clean-up of records fetched from DOI metadata services
//! - Journal name abbreviation

mod customization;
mod entry;
mod formatter;
mod journal_abbreviations;
pub mod parser;

pub use customization::{
    customize_fetched_entry, page_double_hyphen, sanitize_cite_key, sanitize_value,
};
pub use entry::{BibTeXEntry, BibTeXEntryType, BibTeXField};
pub use formatter::{
    format_complete, format_entries, format_entry, format_preamble, format_string_definition,
};
pub use journal_abbreviations::{abbreviate_journal, has_abbreviation};
pub use parser::{
    is_valid_key, parse, parse_entry, parse_strict, BibTeXParseError, BibTeXParseResult, ParseError,
};
