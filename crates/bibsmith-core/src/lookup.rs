//! Fetching BibTeX records for DOIs
//!
//! `doi.org` content negotiation returns a BibTeX record when asked for
//! `application/x-bibtex`, whichever registration agency holds the DOI.

use std::time::Duration;

use bibsmith_bibtex::{parse_entry, BibTeXEntry};
use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::error::{BibError, Result};

pub const DEFAULT_RESOLVER: &str = "https://doi.org";
pub const DEFAULT_USER_AGENT: &str = concat!("bibsmith/", env!("CARGO_PKG_VERSION"));

/// Retrieves the record for an identifier
pub trait EntryLookup {
    fn lookup_entry(&self, identifier: &str) -> Result<BibTeXEntry>;
}

impl<F> EntryLookup for F
where
    F: Fn(&str) -> Result<BibTeXEntry>,
{
    fn lookup_entry(&self, identifier: &str) -> Result<BibTeXEntry> {
        self(identifier)
    }
}

/// Blocking DOI resolver client
pub struct DoiLookup {
    client: Client,
    resolver: String,
}

impl DoiLookup {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| BibError::Config(format!("could not create HTTP client: {e}")))?;
        Ok(Self {
            client,
            resolver: DEFAULT_RESOLVER.to_string(),
        })
    }

    /// Use another resolver base URL (a mirror or a local test server)
    pub fn with_resolver(mut self, resolver: impl Into<String>) -> Self {
        self.resolver = resolver.into();
        self
    }

    pub fn url_for(&self, doi: &str) -> String {
        format!("{}/{}", self.resolver.trim_end_matches('/'), doi)
    }
}

impl EntryLookup for DoiLookup {
    fn lookup_entry(&self, identifier: &str) -> Result<BibTeXEntry> {
        let url = self.url_for(identifier);
        tracing::info!("Looking up DOI {}", identifier);

        let failed = |message: String| BibError::Lookup {
            identifier: identifier.to_string(),
            message,
        };

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/x-bibtex")
            .send()
            .map_err(|e| failed(format!("request failed: {e}")))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(failed("DOI not found".to_string())),
            StatusCode::TOO_MANY_REQUESTS => return Err(failed("rate limited".to_string())),
            status => return Err(failed(format!("HTTP {status}"))),
        }

        let body = response
            .text()
            .map_err(|e| failed(format!("could not read response: {e}")))?;
        parse_entry(&body).map_err(|e| failed(format!("response is not a BibTeX record: {e}")))
    }
}
