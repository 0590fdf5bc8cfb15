//! Identifier resolution URLs

use serde::{Deserialize, Serialize};

/// Types of publication identifiers bibsmith understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierType {
    /// Digital Object Identifier
    Doi,
}

/// Get the URL prefix for an identifier type
pub fn identifier_url_prefix(id_type: IdentifierType) -> &'static str {
    match id_type {
        IdentifierType::Doi => "https://doi.org/",
    }
}

/// Get the full URL for an identifier
pub fn identifier_url(id_type: IdentifierType, value: &str) -> String {
    format!("{}{}", identifier_url_prefix(id_type), value)
}

/// Resolver URL for a DOI, accepting either a bare DOI or `doi:`-prefixed text
pub fn doi_url(doi: &str) -> String {
    let bare = doi.trim().strip_prefix("doi:").unwrap_or(doi.trim());
    identifier_url(IdentifierType::Doi, bare)
}

/// Get the display name for an identifier type
pub fn identifier_display_name(id_type: IdentifierType) -> &'static str {
    match id_type {
        IdentifierType::Doi => "DOI",
    }
}
