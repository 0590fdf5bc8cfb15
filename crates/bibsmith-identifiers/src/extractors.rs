//! DOI extraction and normalization

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Extracted identifier with position information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedIdentifier {
    pub identifier_type: String,
    pub value: String,
    pub start_index: u32,
    pub end_index: u32,
}

lazy_static! {
    // DOI regex: 10.XXXX/... pattern
    // DOIs start with 10. followed by registrant code and suffix
    static ref DOI_REGEX: Regex = Regex::new(
        r#"(?i)(?:doi[:\s]*)?(?:https?://(?:dx\.)?doi\.org/)?(?P<doi>10\.\d{4,}(?:\.\d+)*/[^\s\]}>"',;]+)"#
    ).unwrap();

    // A complete, already-isolated DOI
    static ref BARE_DOI: Regex = Regex::new(r"^10\.\d{4,}(?:\.\d+)*/\S+$").unwrap();

    static ref DOI_PREFIX: Regex = Regex::new(
        r"(?i)^(?:doi:\s*|https?://(?:dx\.)?doi\.org/|(?:dx\.)?doi\.org/)"
    ).unwrap();
}

/// Extract DOIs from text, in order of appearance
pub fn extract_dois(text: &str) -> Vec<String> {
    DOI_REGEX
        .captures_iter(text)
        .filter_map(|cap| cap.name("doi"))
        .map(|m| clean_doi(m.as_str()))
        .filter(|doi| BARE_DOI.is_match(doi))
        .collect()
}

/// Extract the first DOI in a block of text (e.g. the first page of a PDF)
pub fn first_doi(text: &str) -> Option<String> {
    extract_dois(text).into_iter().next()
}

/// Extract all identifiers from text with their positions
pub fn extract_all(text: &str) -> Vec<ExtractedIdentifier> {
    DOI_REGEX
        .captures_iter(text)
        .filter_map(|cap| cap.name("doi"))
        .map(|m| ExtractedIdentifier {
            identifier_type: "doi".to_string(),
            value: clean_doi(m.as_str()),
            start_index: m.start() as u32,
            end_index: m.end() as u32,
        })
        .filter(|id| BARE_DOI.is_match(&id.value))
        .collect()
}

/// Normalize a DOI for comparison
///
/// Drops `doi:` and resolver URL prefixes, decodes `%2F`, lower-cases (DOIs
/// are case-insensitive) and returns `None` if what is left is not a DOI.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let decoded = raw.trim().replace("%2F", "/").replace("%2f", "/");
    let stripped = DOI_PREFIX.replace(&decoded, "");
    let doi = clean_doi(stripped.trim()).to_lowercase();
    if BARE_DOI.is_match(&doi) {
        Some(doi)
    } else {
        None
    }
}

/// Clean a DOI by cutting it at the first non-ASCII character and removing
/// trailing punctuation
///
/// Text extracted from PDFs often runs straight into a symbol such as `©`
/// after the DOI.
fn clean_doi(doi: &str) -> String {
    let end = doi
        .char_indices()
        .find(|(_, c)| !c.is_ascii())
        .map_or(doi.len(), |(idx, _)| idx);
    let mut s = doi[..end].to_string();
    while let Some(c) = s.chars().last() {
        if c == '.' || c == ',' || c == ';' || c == ')' || c == ']' {
            s.pop();
        } else {
            break;
        }
    }
    s
}
