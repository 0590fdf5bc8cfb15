//! Identifier extraction and normalization for bibliography records
//!
//! - DOI extraction from free text (e.g. the first page of a PDF)
//! - DOI normalization for identity comparisons
//! - Resolver URLs for identifiers

pub mod extractors;
pub mod resolver;

pub use extractors::*;
pub use resolver::*;
