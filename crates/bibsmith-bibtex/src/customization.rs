//! Clean-up applied to records fetched from DOI metadata services
//!
//! Metadata services return BibTeX that was converted from HTML and carries
//! a few recurring quirks. These helpers repair the ones seen in practice.

use lazy_static::lazy_static;
use regex::Regex;

use super::entry::BibTeXEntry;

lazy_static! {
    // `{NO}$\less$sub$\greater$ 2$\less$/sub$\greater$` is an HTML <sub> that
    // went through a LaTeX escaper; it should read `{NO}$_{2}$`.
    static ref ESCAPED_SUBSCRIPT: Regex =
        Regex::new(r"\$\\less\$sub\$\\greater\$(?P<sub>.+?)\$\\less\$/sub\$\\greater\$").unwrap();

    // A single hyphen between page numbers
    static ref SINGLE_HYPHEN_RANGE: Regex = Regex::new(r"^\s*(\S+?)\s*[-\u{2013}]\s*(\S+?)\s*$").unwrap();
}

/// Repair HTML conversion artifacts in a field value
pub fn sanitize_value(value: &str) -> String {
    let value = ESCAPED_SUBSCRIPT.replace_all(value, |caps: &regex::Captures| {
        format!("$_{{{}}}$", caps["sub"].trim())
    });
    // Some services percent-encode one of the DOI slashes
    value.replace("%2F", "/")
}

/// Normalize a page range to use the BibTeX double hyphen
pub fn page_double_hyphen(pages: &str) -> String {
    if pages.contains("--") {
        return pages.to_string();
    }
    match SINGLE_HYPHEN_RANGE.captures(pages) {
        Some(caps) => format!("{}--{}", &caps[1], &caps[2]),
        None => pages.to_string(),
    }
}

/// Drop characters that LaTeX handles badly in citation keys
pub fn sanitize_cite_key(key: &str) -> String {
    key.chars().filter(|c| *c != '_').collect()
}

/// Apply every clean-up step to a freshly fetched entry
pub fn customize_fetched_entry(mut entry: BibTeXEntry) -> BibTeXEntry {
    for field in &mut entry.fields {
        field.value = sanitize_value(&field.value);
        if field.key.eq_ignore_ascii_case("pages") {
            field.value = page_double_hyphen(&field.value);
        }
    }
    entry.cite_key = sanitize_cite_key(&entry.cite_key);
    entry
}
