//! DOI extraction from PDF files
//!
//! Only the first page is read: journals print the DOI in the header or the
//! footer of the first page, and later pages cite other papers' DOIs.

use std::path::{Path, PathBuf};

use bibsmith_identifiers::first_doi;
use pdfium_render::prelude::*;
use walkdir::WalkDir;

use crate::driver::Candidate;
use crate::error::{BibError, Result};

/// Finds the identifier of the document stored at a path
pub trait IdentifierExtractor {
    /// `Ok(None)` when the document was readable but carried no identifier
    fn extract_identifier(&self, path: &Path) -> Result<Option<String>>;
}

impl<F> IdentifierExtractor for F
where
    F: Fn(&Path) -> Result<Option<String>>,
{
    fn extract_identifier(&self, path: &Path) -> Result<Option<String>> {
        self(path)
    }
}

/// Reads first-page text with Pdfium
pub struct PdfiumExtractor {
    pdfium: Pdfium,
}

impl PdfiumExtractor {
    /// Bind to a Pdfium library next to the executable, or the system one
    pub fn new() -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| BibError::Config(format!("Pdfium library not available: {e}")))?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    /// Bind to the Pdfium library at `path`
    pub fn with_library(path: &Path) -> Result<Self> {
        let bindings = Pdfium::bind_to_library(path).map_err(|e| {
            BibError::Config(format!("Failed to load Pdfium from {}: {e}", path.display()))
        })?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    fn first_page_text(&self, path: &Path) -> Result<String> {
        let document = self.pdfium.load_pdf_from_file(path, None).map_err(|e| {
            extraction_error(
                path,
                format!("problem parsing the PDF ({e}); it may be too old for text extraction"),
            )
        })?;
        let page = document
            .pages()
            .iter()
            .next()
            .ok_or_else(|| extraction_error(path, "the PDF has no pages".to_string()))?;
        let text = page
            .text()
            .map_err(|e| extraction_error(path, format!("could not read page text: {e}")))?;
        Ok(text.all())
    }
}

impl IdentifierExtractor for PdfiumExtractor {
    fn extract_identifier(&self, path: &Path) -> Result<Option<String>> {
        let text = self.first_page_text(path)?;
        Ok(first_doi(&text))
    }
}

fn extraction_error(path: &Path, message: String) -> BibError {
    BibError::Extraction {
        path: path.to_path_buf(),
        message,
    }
}

/// All `.pdf` files under `dir`, recursively, in file-name order
pub fn find_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(BibError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut pdfs = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable path under {}: {}", dir.display(), e);
                continue;
            }
        };
        let is_pdf = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if entry.file_type().is_file() && is_pdf {
            pdfs.push(entry.into_path());
        }
    }
    tracing::debug!("Found {} PDFs under {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

/// Lazily turns PDF paths into build candidates, one extraction per item
pub struct PdfCandidates<'a, E: IdentifierExtractor + ?Sized> {
    paths: std::vec::IntoIter<PathBuf>,
    extractor: &'a E,
}

impl<'a, E: IdentifierExtractor + ?Sized> PdfCandidates<'a, E> {
    pub fn new(paths: Vec<PathBuf>, extractor: &'a E) -> Self {
        Self {
            paths: paths.into_iter(),
            extractor,
        }
    }

    /// Candidates for every PDF under `dir`
    pub fn from_dir(dir: &Path, extractor: &'a E) -> Result<Self> {
        Ok(Self::new(find_pdfs(dir)?, extractor))
    }
}

impl<E: IdentifierExtractor + ?Sized> Iterator for PdfCandidates<'_, E> {
    type Item = Result<Candidate>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        tracing::debug!("Extracting identifier from {}", path.display());
        let item = match self.extractor.extract_identifier(&path) {
            Ok(Some(identifier)) => Ok(Candidate::from_identifier(path, identifier)),
            Ok(None) => Err(extraction_error(
                &path,
                "no DOI found on the first page".to_string(),
            )),
            Err(e) => Err(e),
        };
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}
