//! Building and updating a bibliography from documents
//!
//! [`UpdateDriver`] adds candidates (a document plus its identifier, and the
//! record when it is already known) to a bibliography. [`BuildJob`] wraps it in
//! the whole read → modify → write cycle run by `bibsmith build`.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bibsmith_bibtex::{abbreviate_journal, customize_fetched_entry, BibTeXEntry};
use bibsmith_identifiers::normalize_doi;
use serde::Serialize;

use crate::bibliography::Bibliography;
use crate::collision::{AddOutcome, CollisionPolicy};
use crate::error::{BibError, Result};
use crate::lookup::EntryLookup;
use crate::model::identifier_of;
use crate::options::{names, rebase_home, OptionsRecord};
use crate::pdf::{IdentifierExtractor, PdfCandidates};
use crate::persist;

/// One document to add
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// The file the record describes; stored in the `file` field
    pub origin: PathBuf,
    pub identifier: Option<String>,
    /// The record, when the caller already has it; looked up otherwise
    pub entry: Option<BibTeXEntry>,
}

impl Candidate {
    pub fn from_identifier(origin: impl Into<PathBuf>, identifier: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            identifier: Some(identifier.into()),
            entry: None,
        }
    }

    pub fn from_entry(origin: impl Into<PathBuf>, entry: BibTeXEntry) -> Self {
        Self {
            origin: origin.into(),
            identifier: identifier_of(&entry),
            entry: Some(entry),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Skip candidates whose identifier is already in the bibliography
    pub skip_if_identifier_exists: bool,
    pub abbreviate_journals: bool,
    /// Record the candidate's origin in the `file` field
    pub attach_file: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            skip_if_identifier_exists: false,
            abbreviate_journals: false,
            attach_file: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCandidate {
    pub origin: PathBuf,
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedKey {
    pub from: String,
    pub to: String,
}

/// A candidate that could not be added, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
    pub origin: Option<PathBuf>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub added: Vec<String>,
    pub replaced: Vec<String>,
    pub renamed: Vec<RenamedKey>,
    pub skipped_existing: Vec<SkippedCandidate>,
    /// Keys refused because they were already taken
    pub rejected: Vec<String>,
    pub failures: Vec<CandidateFailure>,
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added ({} under a new key), {} replaced, {} already present, {} rejected, {} failed",
            self.added.len(),
            self.renamed.len(),
            self.replaced.len(),
            self.skipped_existing.len(),
            self.rejected.len(),
            self.failures.len()
        )
    }
}

impl UpdateReport {
    fn fail(&mut self, origin: Option<PathBuf>, error: &BibError) {
        tracing::warn!("{}", error);
        let origin = origin.or_else(|| match error {
            BibError::Extraction { path, .. } => Some(path.clone()),
            _ => None,
        });
        self.failures.push(CandidateFailure {
            origin,
            message: error.to_string(),
        });
    }
}

pub struct UpdateDriver {
    options: UpdateOptions,
}

impl UpdateDriver {
    pub fn new(options: UpdateOptions) -> Self {
        Self { options }
    }

    /// Add every candidate to `target`
    ///
    /// Per-candidate failures (no identifier, failed lookup, rejected key) are
    /// counted in the report and the run goes on. An abort or any other error
    /// stops the run.
    pub fn run<I, L>(
        &self,
        target: &mut Bibliography,
        candidates: I,
        lookup: &L,
        policy: &mut CollisionPolicy,
    ) -> Result<UpdateReport>
    where
        I: IntoIterator<Item = Result<Candidate>>,
        L: EntryLookup + ?Sized,
    {
        let mut report = UpdateReport::default();
        let mut known: HashSet<String> = target.iter().filter_map(identifier_of).collect();

        for item in candidates {
            let candidate = match item {
                Ok(candidate) => candidate,
                Err(e) if e.is_recoverable() => {
                    report.fail(None, &e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let identifier = candidate
                .identifier
                .as_deref()
                .and_then(normalize_doi)
                .or_else(|| candidate.entry.as_ref().and_then(identifier_of));

            if self.options.skip_if_identifier_exists {
                if let Some(id) = identifier.as_ref().filter(|id| known.contains(*id)) {
                    tracing::info!("{} is already in the bibliography, skipping", id);
                    report.skipped_existing.push(SkippedCandidate {
                        origin: candidate.origin,
                        identifier: id.clone(),
                    });
                    continue;
                }
            }

            let entry = match (candidate.entry, identifier.as_deref()) {
                (Some(entry), _) => entry,
                (None, Some(id)) => match lookup.lookup_entry(id) {
                    Ok(entry) => customize_fetched_entry(entry),
                    Err(e) if e.is_recoverable() => {
                        report.fail(Some(candidate.origin), &e);
                        continue;
                    }
                    Err(e) => return Err(e),
                },
                (None, None) => {
                    let e = BibError::Extraction {
                        path: candidate.origin.clone(),
                        message: "no identifier to look up".to_string(),
                    };
                    report.fail(Some(candidate.origin), &e);
                    continue;
                }
            };

            let entry = self.prepare(entry, &candidate.origin);
            let fetched_identifier = identifier_of(&entry);

            match target.add(entry, policy) {
                Ok(outcome) => {
                    known.extend(identifier.into_iter().chain(fetched_identifier));
                    match outcome {
                        AddOutcome::Inserted { key } => {
                            tracing::info!("Added {}", key);
                            report.added.push(key);
                        }
                        AddOutcome::Replaced { key } => {
                            tracing::info!("Replaced {}", key);
                            report.replaced.push(key);
                        }
                        AddOutcome::Renamed { from, to } => {
                            tracing::info!("Added {} as {}", from, to);
                            report.added.push(to.clone());
                            report.renamed.push(RenamedKey { from, to });
                        }
                    }
                }
                Err(BibError::KeyCollision { key }) => {
                    tracing::warn!(
                        "Key {} already used, {} not added",
                        key,
                        candidate.origin.display()
                    );
                    report.rejected.push(key);
                }
                Err(e) if e.is_recoverable() => report.fail(Some(candidate.origin), &e),
                Err(e) => return Err(e),
            }
        }

        tracing::info!("Update finished: {}", report);
        Ok(report)
    }

    fn prepare(&self, mut entry: BibTeXEntry, origin: &Path) -> BibTeXEntry {
        if self.options.abbreviate_journals {
            if let Some(journal) = entry.journal().map(abbreviate_journal) {
                entry.set_field("journal", journal);
            }
        }
        if self.options.attach_file && !origin.as_os_str().is_empty() {
            entry.set_field("file", origin.display().to_string());
        }
        entry
    }
}

/// Everything `bibsmith build` needs to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub bib_file: PathBuf,
    pub pdf_dir: PathBuf,
    pub no_duplicates: bool,
    pub prune: bool,
    pub backup: bool,
    pub abbreviate_journals: bool,
    /// Rewrite `file` fields onto this home directory
    pub rebase_home: Option<PathBuf>,
    /// Look for new PDFs; off when only rebasing
    pub scan_pdfs: bool,
    /// Store the options record in the bibliography
    pub remember_options: bool,
}

impl BuildOptions {
    pub fn new(bib_file: impl Into<PathBuf>, pdf_dir: impl Into<PathBuf>) -> Self {
        Self {
            bib_file: bib_file.into(),
            pdf_dir: pdf_dir.into(),
            no_duplicates: false,
            prune: false,
            backup: true,
            abbreviate_journals: false,
            rebase_home: None,
            scan_pdfs: true,
            remember_options: true,
        }
    }

    /// The options record describing this run
    pub fn record(&self, previous: Option<&OptionsRecord>) -> OptionsRecord {
        previous
            .cloned()
            .unwrap_or_default()
            .with(names::PDF_DIR, self.pdf_dir.display())
            .with(names::NO_DUP, self.no_duplicates)
            .with(names::ABBREVIATE_JOURNALS, self.abbreviate_journals)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub backup: Option<PathBuf>,
    pub rebased: usize,
    pub pruned: Vec<String>,
    pub update: UpdateReport,
    /// Entries in the saved bibliography
    pub total: usize,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; {} entries in total", self.update, self.total)?;
        if !self.pruned.is_empty() {
            write!(f, ", {} pruned", self.pruned.len())?;
        }
        if self.rebased > 0 {
            write!(f, ", {} file paths rebased", self.rebased)?;
        }
        Ok(())
    }
}

/// One `bibsmith build` run
pub struct BuildJob {
    options: BuildOptions,
}

impl BuildJob {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Load, update and atomically save the bibliography
    ///
    /// Nothing is written unless every step up to the save succeeded.
    pub fn run<E, L>(
        &self,
        extractor: &E,
        lookup: &L,
        policy: &mut CollisionPolicy,
    ) -> Result<BuildReport>
    where
        E: IdentifierExtractor + ?Sized,
        L: EntryLookup + ?Sized,
    {
        let options = &self.options;
        let mut report = BuildReport::default();
        let mut bibliography = Bibliography::load_or_default(&options.bib_file)?.bibliography;

        if options.backup {
            report.backup = persist::backup(&options.bib_file)?;
        }

        if let Some(home) = &options.rebase_home {
            report.rebased = rebase_file_fields(&mut bibliography, home);
        }

        if options.prune {
            report.pruned = prune_missing_files(&mut bibliography);
        }

        if options.scan_pdfs {
            let pdf_dir = fs::canonicalize(&options.pdf_dir)
                .map_err(|e| BibError::io(&options.pdf_dir, e))?;
            tracing::info!("Searching {} for PDFs", pdf_dir.display());
            let candidates = PdfCandidates::from_dir(&pdf_dir, extractor)?;
            let driver = UpdateDriver::new(UpdateOptions {
                skip_if_identifier_exists: options.no_duplicates,
                abbreviate_journals: options.abbreviate_journals,
                attach_file: true,
            });
            report.update = driver.run(&mut bibliography, candidates, lookup, policy)?;
        }

        if options.remember_options {
            let record = options.record(bibliography.options());
            bibliography.set_options(Some(record));
        }

        bibliography.save(&options.bib_file)?;
        report.total = bibliography.len();
        Ok(report)
    }
}

/// Rewrite `file` fields that point into another home directory
fn rebase_file_fields(bibliography: &mut Bibliography, home: &Path) -> usize {
    let mut changed = 0;
    bibliography.entries_mut_with(|key, fields| {
        for field in fields.iter_mut().filter(|f| f.key.eq_ignore_ascii_case("file")) {
            let rebased = rebase_home(&field.value, home);
            if rebased != field.value {
                tracing::debug!("{}: {} -> {}", key, field.value, rebased);
                field.value = rebased;
                changed += 1;
            }
        }
    });
    changed
}

/// Drop entries whose `file` no longer exists; entries without one stay
fn prune_missing_files(bibliography: &mut Bibliography) -> Vec<String> {
    let mut pruned = Vec::new();
    bibliography.retain(|entry| match entry.file() {
        Some(file) if !Path::new(file).exists() => {
            tracing::info!("Pruning {}: {} no longer exists", entry.cite_key, file);
            pruned.push(entry.cite_key.clone());
            false
        }
        _ => true,
    });
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Resolution;
    use bibsmith_bibtex::BibTeXEntryType;
    use std::cell::RefCell;

    fn fetched(key: &str, doi: &str) -> BibTeXEntry {
        BibTeXEntry::new(key, BibTeXEntryType::Article)
            .with_field("title", format!("Paper {key}"))
            .with_field("doi", doi)
            .with_field("journal", "Geophysical Research Letters")
            .with_field("pages", "1-10")
    }

    #[test]
    fn test_lookup_result_is_customized_and_attached() {
        let mut target = Bibliography::new();
        let lookup = |doi: &str| -> Result<BibTeXEntry> { Ok(fetched("smith_2020", doi)) };
        let driver = UpdateDriver::new(UpdateOptions {
            abbreviate_journals: true,
            ..UpdateOptions::default()
        });

        let report = driver
            .run(
                &mut target,
                vec![Ok(Candidate::from_identifier("/papers/a.pdf", "10.1000/A"))],
                &lookup,
                &mut CollisionPolicy::Reject,
            )
            .unwrap();

        assert_eq!(report.added, vec!["smith2020".to_string()]);
        let entry = target.get("smith2020").unwrap();
        assert_eq!(entry.file(), Some("/papers/a.pdf"));
        assert_eq!(entry.get_field("pages"), Some("1--10"));
        assert_eq!(entry.journal(), Some("Geophys. Res. Lett."));
    }

    #[test]
    fn test_known_identifiers_grow_during_run() {
        let mut target = Bibliography::new();
        let calls = RefCell::new(0);
        let lookup = |doi: &str| -> Result<BibTeXEntry> {
            *calls.borrow_mut() += 1;
            Ok(fetched("k", doi))
        };
        let driver = UpdateDriver::new(UpdateOptions {
            skip_if_identifier_exists: true,
            ..UpdateOptions::default()
        });

        let report = driver
            .run(
                &mut target,
                vec![
                    Ok(Candidate::from_identifier("a.pdf", "10.1000/x")),
                    Ok(Candidate::from_identifier("copy-of-a.pdf", "doi:10.1000/X")),
                ],
                &lookup,
                &mut CollisionPolicy::Reject,
            )
            .unwrap();

        assert_eq!(*calls.borrow(), 1);
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.skipped_existing.len(), 1);
        assert_eq!(report.skipped_existing[0].identifier, "10.1000/x");
    }

    #[test]
    fn test_recoverable_failures_are_counted() {
        let mut target = Bibliography::new();
        let lookup = |doi: &str| -> Result<BibTeXEntry> {
            Err(BibError::Lookup {
                identifier: doi.to_string(),
                message: "DOI not found".to_string(),
            })
        };
        let candidates = vec![
            Err(BibError::Extraction {
                path: PathBuf::from("scan.pdf"),
                message: "no DOI found on the first page".to_string(),
            }),
            Ok(Candidate::from_identifier("b.pdf", "10.1000/b")),
            Ok(Candidate {
                origin: PathBuf::from("c.pdf"),
                identifier: None,
                entry: None,
            }),
        ];

        let report = UpdateDriver::new(UpdateOptions::default())
            .run(&mut target, candidates, &lookup, &mut CollisionPolicy::Reject)
            .unwrap();

        assert!(target.is_empty());
        let origins: Vec<_> = report
            .failures
            .iter()
            .map(|f| f.origin.clone().unwrap())
            .collect();
        assert_eq!(
            origins,
            vec![PathBuf::from("scan.pdf"), PathBuf::from("b.pdf"), PathBuf::from("c.pdf")]
        );
    }

    #[test]
    fn test_collisions_follow_policy() {
        let (mut target, _) = Bibliography::from_entries(vec![fetched("k", "10.1/old")]);
        let lookup = |doi: &str| -> Result<BibTeXEntry> { Ok(fetched("k", doi)) };
        let driver = UpdateDriver::new(UpdateOptions::default());

        let report = driver
            .run(
                &mut target,
                vec![Ok(Candidate::from_identifier("new.pdf", "10.1/new"))],
                &lookup,
                &mut CollisionPolicy::Reject,
            )
            .unwrap();
        assert_eq!(report.rejected, vec!["k".to_string()]);

        let mut abort = CollisionPolicy::ask(|_: &BibTeXEntry, _: &BibTeXEntry| Resolution::Abort);
        let err = driver
            .run(
                &mut target,
                vec![Ok(Candidate::from_identifier("new.pdf", "10.1/new"))],
                &lookup,
                &mut abort,
            )
            .unwrap_err();
        assert!(matches!(err, BibError::Aborted { .. }));
    }

    #[test]
    fn test_rebase_and_prune() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.pdf");
        fs::write(&present, b"").unwrap();

        let (mut bib, _) = Bibliography::from_entries(vec![
            fetched("a", "10.1/a").with_field("file", present.display().to_string()),
            fetched("b", "10.1/b").with_field("file", "/nowhere/gone.pdf"),
            fetched("c", "10.1/c"),
            fetched("d", "10.1/d").with_field("file", "/home/alice/x.pdf"),
        ]);

        assert_eq!(rebase_file_fields(&mut bib, Path::new("/home/bob")), 1);
        assert_eq!(bib.get("d").and_then(|e| e.file()), Some("/home/bob/x.pdf"));

        let pruned = prune_missing_files(&mut bib);
        assert_eq!(pruned, vec!["b".to_string(), "d".to_string()]);
        assert_eq!(bib.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_record_keeps_unrelated_options() {
        let previous = OptionsRecord::new().with("CUSTOM", "x");
        let options = BuildOptions::new("refs.bib", "/papers");
        let record = options.record(Some(&previous));
        assert_eq!(record.get("CUSTOM"), Some("x"));
        assert_eq!(record.get(names::PDF_DIR), Some("/papers"));
        assert_eq!(record.get_bool(names::NO_DUP), Some(false));
    }

    #[test]
    fn test_prepare_leaves_key_fields_alone() {
        let driver = UpdateDriver::new(UpdateOptions {
            attach_file: false,
            ..UpdateOptions::default()
        });
        let entry = driver.prepare(fetched("k", "10.1/k"), Path::new("x.pdf"));
        assert!(entry.file().is_none());
        assert_eq!(entry.journal(), Some("Geophysical Research Letters"));
    }
}
