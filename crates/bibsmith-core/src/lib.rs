//! bibsmith-core: bibliography building, merging and rendering
//!
//! This library provides:
//! - Entry identity (normalization, content equality, identifiers)
//! - The bibliography container with key-collision policies
//! - The merge engine (duplicate suppression, exclusion lists)
//! - The build driver (PDF → DOI → BibTeX record)
//! - HTML rendering for publication lists
//!
//! Every file is replaced atomically; a failed run leaves its target as it
//! was.

pub mod bibliography;
pub mod collision;
pub mod config;
pub mod driver;
pub mod error;
pub mod lookup;
pub mod merge;
pub mod model;
pub mod options;
pub mod pdf;
pub mod persist;
pub mod render;

pub use bibliography::{Bibliography, DuplicateKeyWarning, Loaded};
pub use collision::{AddOutcome, CollisionPolicy, CollisionResolver, Resolution};
pub use config::{BibsmithConfig, ConflictMode};
pub use driver::{
    BuildJob, BuildOptions, BuildReport, Candidate, UpdateDriver, UpdateOptions, UpdateReport,
};
pub use error::{BibError, Result};
pub use lookup::{DoiLookup, EntryLookup};
pub use merge::{merge, MergeOptions, MergeOutcome, MergeReport};
pub use model::{content_equal, identifier_of, normalize, ContentRule, ContentSignature};
pub use options::OptionsRecord;
pub use pdf::{IdentifierExtractor, PdfCandidates, PdfiumExtractor};
pub use render::{render_html, render_web_page, RenderOptions, YearHeader};

// Re-export the entry types so callers need only this crate
pub use bibsmith_bibtex::{BibTeXEntry, BibTeXEntryType, BibTeXField};
