//! BibTeX formatting module
//!
//! Converts BibTeXEntry structures back to BibTeX string format.

use super::entry::BibTeXEntry;

/// Format a single BibTeX entry to string
pub fn format_entry(entry: &BibTeXEntry) -> String {
    let mut result = String::new();

    result.push('@');
    result.push_str(entry.entry_type.as_str());
    result.push('{');
    result.push_str(&entry.cite_key);
    result.push(',');
    result.push('\n');

    for field in &entry.fields {
        result.push_str("    ");
        result.push_str(&field.key);
        result.push_str(" = ");
        result.push_str(&format_field_value(&field.value));
        result.push(',');
        result.push('\n');
    }

    result.push('}');
    result
}

/// Format multiple entries to a single BibTeX string
pub fn format_entries<'a>(entries: impl IntoIterator<Item = &'a BibTeXEntry>) -> String {
    entries
        .into_iter()
        .map(format_entry)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format a field value, choosing appropriate delimiters
fn format_field_value(value: &str) -> String {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return value.to_string();
    }

    // Braces preserve LaTeX commands and case protection
    let mut result = String::with_capacity(value.len() + 2);
    result.push('{');
    result.push_str(value);
    result.push('}');
    result
}

/// Format a @string definition
pub fn format_string_definition(key: &str, value: &str) -> String {
    format!("@string{{{} = {}}}", key, format_field_value(value))
}

/// Format a @preamble
pub fn format_preamble(text: &str) -> String {
    format!("@preamble{{{}}}", format_field_value(text))
}

/// Format a complete BibTeX file with strings, preambles, and entries
///
/// The output always ends with a single newline.
pub fn format_complete(
    preambles: &[String],
    strings: &[(String, String)],
    entries: &[BibTeXEntry],
) -> String {
    let mut result = String::new();

    for preamble in preambles {
        result.push_str(&format_preamble(preamble));
        result.push_str("\n\n");
    }

    for (key, value) in strings {
        result.push_str(&format_string_definition(key, value));
        result.push_str("\n\n");
    }

    for entry in entries {
        result.push_str(&format_entry(entry));
        result.push_str("\n\n");
    }

    let mut result = result.trim_end().to_string();
    result.push('\n');
    result
}
