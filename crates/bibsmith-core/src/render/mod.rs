//! Rendering a bibliography into a web page
//!
//! Entries are grouped by year, newest first, and written as one `<p>` per
//! entry between the `<!--START BIB-->` and `<!--END BIB-->` marker lines of
//! an existing page. Everything between the markers is replaced.

mod format;

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use bibsmith_bibtex::BibTeXEntry;
use serde::{Deserialize, Serialize};

pub use format::{
    format_doi, format_pages, format_title, split_authors, EntryFormatter, PersonName,
};

use crate::bibliography::Bibliography;
use crate::error::{BibError, Result};
use crate::persist;

pub const BIB_START: &str = "<!--START BIB-->";
pub const BIB_END: &str = "<!--END BIB-->";

/// Heading used for entries without a year
pub const NO_YEAR: &str = "n.d.";

/// How each year section is introduced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearHeader {
    #[default]
    Std,
    Bootstrap,
    /// A template where `{}` or `{0}` is replaced by the year
    Custom(String),
}

impl YearHeader {
    /// `std`, `bootstrap`, or anything else as a custom template
    pub fn parse(style: &str) -> Self {
        match style {
            "std" => YearHeader::Std,
            "bootstrap" => YearHeader::Bootstrap,
            template => YearHeader::Custom(template.to_string()),
        }
    }

    pub fn render(&self, year: &str) -> String {
        match self {
            YearHeader::Std => format!("<h3>{year}</h3>"),
            YearHeader::Bootstrap => {
                format!("<h3><span class=\"badge badge-dark\">{year}</span></h3>")
            }
            YearHeader::Custom(template) => template.replace("{0}", year).replace("{}", year),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Last names to print in bold
    pub bold_authors: Vec<String>,
    /// Entry types to include; empty means all
    pub entry_types: Vec<String>,
    /// List entries led by a bold author first within each year
    pub promote_bold_first_author: bool,
    pub year_header: YearHeader,
}

/// Entries of one year, in display order
#[derive(Debug, Clone, PartialEq)]
pub struct YearGroup<'a> {
    pub year: String,
    pub entries: Vec<&'a BibTeXEntry>,
}

/// Group entries by year, newest first, entries without a year last
pub fn group_by_year<'a>(bib: &'a Bibliography, options: &RenderOptions) -> Vec<YearGroup<'a>> {
    let formatter = EntryFormatter::new(options.bold_authors.iter().cloned());
    let mut groups: Vec<YearGroup<'a>> = Vec::new();

    for entry in bib.iter().filter(|e| type_selected(e, options)) {
        let year = match entry.year().map(str::trim).filter(|y| !y.is_empty()) {
            Some(year) => year.to_string(),
            None => {
                tracing::warn!("{} has no year", entry.cite_key);
                NO_YEAR.to_string()
            }
        };
        match groups.iter_mut().find(|g| g.year == year) {
            Some(group) => group.entries.push(entry),
            None => groups.push(YearGroup {
                year,
                entries: vec![entry],
            }),
        }
    }

    groups.sort_by(|a, b| compare_years(&a.year, &b.year));

    if options.promote_bold_first_author {
        for group in &mut groups {
            // sort_by_key is stable, so ties keep file order
            group
                .entries
                .sort_by_key(|e| !formatter.first_author_is_bold(e));
        }
    }
    groups
}

fn type_selected(entry: &BibTeXEntry, options: &RenderOptions) -> bool {
    options.entry_types.is_empty()
        || options
            .entry_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(entry.entry_type.as_str()))
}

/// Descending; numeric years before other labels, `n.d.` last
fn compare_years(a: &str, b: &str) -> Ordering {
    match (a == NO_YEAR, b == NO_YEAR) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => y.cmp(&x),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => b.cmp(a),
    }
}

/// The HTML placed between the markers
pub fn render_html(bib: &Bibliography, options: &RenderOptions) -> String {
    render_groups(&group_by_year(bib, options), options)
}

fn render_groups(groups: &[YearGroup<'_>], options: &RenderOptions) -> String {
    let formatter = EntryFormatter::new(options.bold_authors.iter().cloned());
    let mut html = String::new();
    for group in groups {
        let anchor: String = group.year.chars().filter(|c| c.is_alphanumeric()).collect();
        html.push_str(&format!("<a name=\"{anchor}\"></a>"));
        html.push_str(&options.year_header.render(&group.year));
        html.push_str("\n\n");
        for entry in &group.entries {
            html.push_str(&format!("<p>{}</p>\n\n", formatter.format_entry(entry)));
        }
    }
    html
}

/// Replace everything between the marker lines of `page` with `fragment`
///
/// The marker lines themselves are kept.
pub fn splice_into_page(page: &str, fragment: &str) -> Result<String> {
    let lines: Vec<&str> = page.split_inclusive('\n').collect();
    let start = lines
        .iter()
        .position(|l| l.trim_start().starts_with(BIB_START))
        .ok_or_else(|| BibError::Template(format!("page has no {BIB_START} line")))?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| l.trim_start().starts_with(BIB_END))
        .map(|i| i + start + 1)
        .ok_or_else(|| BibError::Template(format!("page has no {BIB_END} line after {BIB_START}")))?;

    let mut out = String::with_capacity(page.len() + fragment.len());
    for line in &lines[..=start] {
        out.push_str(line);
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(fragment);
    for line in &lines[end..] {
        out.push_str(line);
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderReport {
    pub entries: usize,
    pub years: usize,
    pub backup: Option<PathBuf>,
}

/// Render `bib_file` into the page at `html_file`, replacing it atomically
pub fn render_web_page(
    bib_file: &Path,
    html_file: &Path,
    options: &RenderOptions,
    backup: bool,
) -> Result<RenderReport> {
    let bib = Bibliography::load(bib_file)?.bibliography;
    let page = fs::read_to_string(html_file).map_err(|e| BibError::io(html_file, e))?;

    let groups = group_by_year(&bib, options);
    let report_entries: usize = groups.iter().map(|g| g.entries.len()).sum();
    let years = groups.len();

    let page = splice_into_page(&page, &render_groups(&groups, options))?;
    let backup = if backup {
        persist::backup(html_file)?
    } else {
        None
    };
    persist::write_atomic(html_file, &page)?;
    tracing::info!(
        "Rendered {} entries in {} years into {}",
        report_entries,
        years,
        html_file.display()
    );

    Ok(RenderReport {
        entries: report_entries,
        years,
        backup,
    })
}
