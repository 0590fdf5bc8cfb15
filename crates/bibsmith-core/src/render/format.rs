//! HTML formatting of single entries

use bibsmith_bibtex::BibTeXEntry;
use bibsmith_identifiers::{doi_url, normalize_doi};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref AUTHOR_SEPARATOR: Regex = Regex::new(r"(?i)\s+and\s+").unwrap();
    static ref SUBSCRIPT_OPEN: Regex = Regex::new(r"\$_\{?").unwrap();
    static ref PAGE_RANGE: Regex = Regex::new(r"(\d)--(\d)").unwrap();
}

/// A personal name split into its BibTeX parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonName {
    pub first: String,
    pub von: String,
    pub last: String,
    pub jr: String,
}

impl PersonName {
    /// Split `First von Last`, `von Last, First` or `von Last, Jr, First`
    pub fn parse(name: &str) -> Self {
        let parts: Vec<&str> = name.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [von_last, jr, first, ..] => {
                let (von, last) = split_von_last(von_last);
                Self {
                    first: first.to_string(),
                    von,
                    last,
                    jr: jr.to_string(),
                }
            }
            [von_last, first] => {
                let (von, last) = split_von_last(von_last);
                Self {
                    first: first.to_string(),
                    von,
                    last,
                    jr: String::new(),
                }
            }
            _ => {
                let words: Vec<&str> = name.split_whitespace().collect();
                let Some((last, rest)) = words.split_last() else {
                    return Self::default();
                };
                let von_start = rest.iter().position(|w| starts_lowercase(w)).unwrap_or(rest.len());
                Self {
                    first: rest[..von_start].join(" "),
                    von: rest[von_start..].join(" "),
                    last: last.to_string(),
                    jr: String::new(),
                }
            }
        }
    }

    /// `von Last Jr, First`
    pub fn last_first(&self) -> String {
        let surname = join_nonempty(&[&self.von, &self.last, &self.jr]);
        if self.first.is_empty() {
            surname
        } else {
            format!("{}, {}", surname, self.first)
        }
    }

    /// `First von Last Jr`
    pub fn first_last(&self) -> String {
        join_nonempty(&[&self.first, &self.von, &self.last, &self.jr])
    }

    /// First word of the last name, braces removed
    pub fn surname_key(&self) -> String {
        strip_braces(self.last.split_whitespace().next().unwrap_or(""))
    }
}

fn split_von_last(von_last: &str) -> (String, String) {
    let words: Vec<&str> = von_last.split_whitespace().collect();
    let last_start = words
        .iter()
        .rposition(|w| starts_lowercase(w))
        .map(|i| i + 1)
        .filter(|i| *i < words.len())
        .unwrap_or(0);
    (words[..last_start].join(" "), words[last_start..].join(" "))
}

fn starts_lowercase(word: &str) -> bool {
    word.trim_start_matches('{')
        .chars()
        .next()
        .is_some_and(char::is_lowercase)
}

fn join_nonempty(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_braces(s: &str) -> String {
    s.replace(['{', '}'], "")
}

/// Split an author list on `and`
pub fn split_authors(authors: &str) -> Vec<PersonName> {
    AUTHOR_SEPARATOR
        .split(authors.trim())
        .filter(|a| !a.trim().is_empty())
        .map(PersonName::parse)
        .collect()
}

/// Formats entries as one line of HTML each
#[derive(Debug, Clone, Default)]
pub struct EntryFormatter {
    bold_authors: Vec<String>,
}

impl EntryFormatter {
    pub fn new(bold_authors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            bold_authors: bold_authors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_bold(&self, name: &PersonName) -> bool {
        let surname = name.surname_key();
        self.bold_authors.iter().any(|a| *a == surname)
    }

    /// Whether the entry's first author is one of the bold authors
    pub fn first_author_is_bold(&self, entry: &BibTeXEntry) -> bool {
        entry
            .author()
            .map(split_authors)
            .and_then(|names| names.into_iter().next())
            .is_some_and(|first| self.is_bold(&first))
    }

    /// `authors, title, <i>journal</i>, <i>volume</i>, pages, doi, year.`
    ///
    /// Missing fields are left out together with their separator. When there
    /// is no DOI, a link to the URL takes its place.
    pub fn format_entry(&self, entry: &BibTeXEntry) -> String {
        let doi = entry.doi().and_then(format_doi).or_else(|| {
            entry.get_field("url").map(|url| format!("<a href=\"{url}\" target=\"_blank\">Link</a>"))
        });

        let pieces = [
            entry.author().map(|a| self.format_authors(a)),
            entry.title().map(format_title),
            entry.journal().map(|j| format!("<i>{}</i>", strip_braces(j))),
            entry.get_field("volume").map(|v| format!("<i>{}</i>", strip_braces(v))),
            entry.get_field("pages").map(format_pages),
            doi,
            entry.year().map(str::to_string),
        ];

        let mut line = pieces.into_iter().flatten().collect::<Vec<_>>().join(", ");
        line.push('.');
        line
    }

    /// First author as `Last, First`, the others as `First Last`
    pub fn format_authors(&self, authors: &str) -> String {
        let names = split_authors(authors);
        let count = names.len();
        let mut out = String::new();
        for (i, name) in names.iter().enumerate() {
            let text = if i == 0 { name.last_first() } else { name.first_last() };
            if self.is_bold(name) {
                out.push_str(&format!("<strong>{text}</strong>"));
            } else {
                out.push_str(&text);
            }
            if i + 1 < count {
                out.push_str(", ");
            }
            if count > 1 && i + 2 == count {
                out.push_str("and ");
            }
        }
        strip_braces(&out)
    }
}

/// Turn `$_2$` and `$_{long}$` subscripts into `<sub>` and drop braces
pub fn format_title(title: &str) -> String {
    let title = SUBSCRIPT_OPEN.replace_all(title, "<sub>");
    strip_braces(&title.replace('$', "</sub>"))
}

/// `12--19` → `12&mdash;19`
pub fn format_pages(pages: &str) -> String {
    PAGE_RANGE.replace_all(pages, "$1&mdash;$2").into_owned()
}

/// A `doi:` link, or `None` when the value is not a DOI
pub fn format_doi(doi: &str) -> Option<String> {
    match normalize_doi(doi) {
        Some(normalized) => Some(format!(
            "<a href=\"{}\" target=\"_blank\">doi:{}</a>",
            doi_url(&normalized),
            normalized
        )),
        None => {
            tracing::warn!("Ignoring malformed DOI {}", doi);
            None
        }
    }
}
