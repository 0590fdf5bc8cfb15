//! Entry identity: normalization, content equality and identifiers
//!
//! Two entries are *content-equal* when their [`ContentSignature`]s match.
//! The signature is a deterministic projection of the entry (its type plus the
//! normalized core fields), so content equality is an equivalence relation
//! and can be checked with a hash lookup.

use bibsmith_bibtex::BibTeXEntry;
use bibsmith_identifiers::{first_doi, normalize_doi};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Fields compared by default when looking for content duplicates
pub const DEFAULT_CORE_FIELDS: [&str; 4] = ["author", "title", "year", "doi"];

/// An entry with normalized field names and values
///
/// The key is kept exactly as written; keys are identifiers, not prose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEntry {
    pub key: String,
    pub entry_type: String,
    pub fields: Vec<(String, String)>,
}

/// Normalize an entry for comparison
pub fn normalize(entry: &BibTeXEntry) -> NormalizedEntry {
    NormalizedEntry {
        key: entry.cite_key.clone(),
        entry_type: entry.entry_type.as_str().to_lowercase(),
        fields: entry
            .fields
            .iter()
            .map(|f| {
                let name = f.key.to_lowercase();
                let value = normalize_field(&name, &f.value);
                (name, value)
            })
            .collect(),
    }
}

/// Normalize one field value; `name` must already be lower-case
pub fn normalize_field(name: &str, value: &str) -> String {
    if name == "doi" {
        if let Some(doi) = normalize_doi(value) {
            return doi;
        }
    }
    normalize_value(value)
}

/// Normalize free text
///
/// - Unicode NFKC (composed and decomposed accents compare equal)
/// - Removes BibTeX case-protection braces
/// - Converts to lowercase
/// - Trims and collapses whitespace
pub fn normalize_value(value: &str) -> String {
    let result: String = value
        .nfkc()
        .filter(|c| *c != '{' && *c != '}')
        .collect::<String>()
        .to_lowercase();
    collapse_whitespace(result.trim())
}

/// Collapse multiple whitespace characters into a single space
fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;

    for c in s.chars() {
        if c.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(c);
            prev_was_space = false;
        }
    }

    result
}

/// The projection compared by [`ContentRule::content_equal`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentSignature {
    entry_type: String,
    fields: SignatureFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SignatureFields {
    /// Normalized value (or absence) of each core field, in rule order
    Core(Vec<Option<String>>),
    /// Every field, sorted; used when an entry has none of the core fields
    Full(Vec<(String, String)>),
}

/// Which fields make two entries "the same record"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRule {
    core_fields: Vec<String>,
}

impl Default for ContentRule {
    fn default() -> Self {
        Self::new(DEFAULT_CORE_FIELDS)
    }
}

impl ContentRule {
    /// Create a rule comparing the given fields (names are case-insensitive)
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut core_fields: Vec<String> = Vec::new();
        for field in fields {
            let name = field.as_ref().trim().to_lowercase();
            if !name.is_empty() && !core_fields.contains(&name) {
                core_fields.push(name);
            }
        }
        Self { core_fields }
    }

    pub fn core_fields(&self) -> &[String] {
        &self.core_fields
    }

    /// Compute the signature of an entry under this rule
    pub fn signature(&self, entry: &BibTeXEntry) -> ContentSignature {
        let entry_type = entry.entry_type.as_str().to_lowercase();
        let core: Vec<Option<String>> = self
            .core_fields
            .iter()
            .map(|name| {
                entry
                    .get_field(name)
                    .map(|value| normalize_field(name, value))
                    .filter(|value| !value.is_empty())
            })
            .collect();

        let fields = if core.iter().any(Option::is_some) {
            SignatureFields::Core(core)
        } else {
            let mut all = normalize(entry).fields;
            all.sort();
            SignatureFields::Full(all)
        };

        ContentSignature { entry_type, fields }
    }

    /// True iff the two entries describe the same record, whatever their keys
    pub fn content_equal(&self, a: &BibTeXEntry, b: &BibTeXEntry) -> bool {
        self.signature(a) == self.signature(b)
    }
}

/// [`ContentRule::content_equal`] with the default core fields
pub fn content_equal(a: &BibTeXEntry, b: &BibTeXEntry) -> bool {
    ContentRule::default().content_equal(a, b)
}

/// The normalized DOI of an entry, if it has one
///
/// Looks at the `doi` field first, then for a DOI inside the `url` field.
pub fn identifier_of(entry: &BibTeXEntry) -> Option<String> {
    if let Some(doi) = entry.doi().and_then(normalize_doi) {
        return Some(doi);
    }
    entry
        .get_field("url")
        .and_then(first_doi)
        .and_then(|doi| normalize_doi(&doi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibsmith_bibtex::BibTeXEntryType;

    fn article(key: &str) -> BibTeXEntry {
        BibTeXEntry::new(key, BibTeXEntryType::Article)
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("  The {DNA}   of\tthings "), "the dna of things");
        assert_eq!(normalize_value("Caf\u{0065}\u{0301}"), normalize_value("Caf\u{00e9}"));
    }

    #[test]
    fn test_normalize_keeps_key_case() {
        let entry = article("Smith2020").with_field("TITLE", "A  Title");
        let normalized = normalize(&entry);
        assert_eq!(normalized.key, "Smith2020");
        assert_eq!(normalized.fields, vec![("title".to_string(), "a title".to_string())]);
    }

    #[test]
    fn test_content_equal_ignores_key_case_and_spacing() {
        let a = article("smith2020")
            .with_field("author", "John Smith")
            .with_field("title", "On  Things")
            .with_field("year", "2020");
        let b = article("other")
            .with_field("Author", "john smith")
            .with_field("title", "on things")
            .with_field("year", "2020")
            .with_field("note", "extra fields are not compared");
        assert!(content_equal(&a, &b));
    }

    #[test]
    fn test_content_differs_on_type() {
        let a = article("a").with_field("title", "Same");
        let b = BibTeXEntry::new("a", BibTeXEntryType::Misc).with_field("title", "Same");
        assert!(!content_equal(&a, &b));
    }

    #[test]
    fn test_missing_core_field_is_a_difference() {
        let a = article("a").with_field("title", "Same").with_field("year", "2020");
        let b = article("b").with_field("title", "Same");
        assert!(!content_equal(&a, &b));
    }

    #[test]
    fn test_doi_forms_compare_equal() {
        let a = article("a").with_field("doi", "10.1000/XYZ");
        let b = article("b").with_field("doi", "https://doi.org/10.1000/xyz");
        assert!(content_equal(&a, &b));
    }

    #[test]
    fn test_entries_without_core_fields_compare_all_fields() {
        let a = BibTeXEntry::new("a", BibTeXEntryType::Misc).with_field("note", "first");
        let b = BibTeXEntry::new("b", BibTeXEntryType::Misc).with_field("note", "second");
        let c = BibTeXEntry::new("c", BibTeXEntryType::Misc).with_field("NOTE", "First");
        assert!(!content_equal(&a, &b));
        assert!(content_equal(&a, &c));
    }

    #[test]
    fn test_custom_rule() {
        let rule = ContentRule::new(["Title", "title", " "]);
        assert_eq!(rule.core_fields(), &["title".to_string()]);
        let a = article("a").with_field("title", "Same").with_field("year", "2020");
        let b = article("b").with_field("title", "Same").with_field("year", "2021");
        assert!(rule.content_equal(&a, &b));
        assert!(!content_equal(&a, &b));
    }

    #[test]
    fn test_identifier_of() {
        assert_eq!(
            identifier_of(&article("a").with_field("doi", "doi:10.1000/XYZ")),
            Some("10.1000/xyz".to_string())
        );
        assert_eq!(
            identifier_of(&article("a").with_field("url", "https://doi.org/10.1000/abc")),
            Some("10.1000/abc".to_string())
        );
        assert_eq!(identifier_of(&article("a").with_field("url", "https://example.org")), None);
        assert_eq!(identifier_of(&article("a")), None);
    }
}
