//! Key-collision policies
//!
//! A collision happens when an entry is added under a key the bibliography
//! already holds. Interactive resolution is a caller-supplied
//! [`CollisionResolver`], so the merge and build algorithms never touch a
//! terminal themselves.

use std::fmt;

use bibsmith_bibtex::BibTeXEntry;
use serde::{Deserialize, Serialize};

/// What to do with one colliding entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the existing entry, refuse the incoming one
    Reject,
    /// Overwrite the existing entry in place
    Replace,
    /// Keep both, appending a suffix to the incoming key
    Rename,
    /// Keep both, storing the incoming entry under this key
    RenameTo(String),
    /// Stop the whole run
    Abort,
}

/// Decides collisions for [`CollisionPolicy::Ask`]
pub trait CollisionResolver {
    fn resolve(&mut self, existing: &BibTeXEntry, incoming: &BibTeXEntry) -> Resolution;
}

impl<F> CollisionResolver for F
where
    F: FnMut(&BibTeXEntry, &BibTeXEntry) -> Resolution,
{
    fn resolve(&mut self, existing: &BibTeXEntry, incoming: &BibTeXEntry) -> Resolution {
        self(existing, incoming)
    }
}

/// How `Bibliography::add` treats an existing key
pub enum CollisionPolicy {
    Reject,
    Replace,
    Rename,
    Ask(Box<dyn CollisionResolver>),
}

impl CollisionPolicy {
    /// Wrap a resolver (closure or type) in [`CollisionPolicy::Ask`]
    pub fn ask(resolver: impl CollisionResolver + 'static) -> Self {
        CollisionPolicy::Ask(Box::new(resolver))
    }

    /// `Ask` when a user is present, `Reject` for scripted runs
    pub fn default_for(interactive: Option<Box<dyn CollisionResolver>>) -> Self {
        match interactive {
            Some(resolver) => CollisionPolicy::Ask(resolver),
            None => CollisionPolicy::Reject,
        }
    }

    pub(crate) fn decide(&mut self, existing: &BibTeXEntry, incoming: &BibTeXEntry) -> Resolution {
        match self {
            CollisionPolicy::Reject => Resolution::Reject,
            CollisionPolicy::Replace => Resolution::Replace,
            CollisionPolicy::Rename => Resolution::Rename,
            CollisionPolicy::Ask(resolver) => resolver.resolve(existing, incoming),
        }
    }
}

impl fmt::Debug for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionPolicy::Reject => f.write_str("Reject"),
            CollisionPolicy::Replace => f.write_str("Replace"),
            CollisionPolicy::Rename => f.write_str("Rename"),
            CollisionPolicy::Ask(_) => f.write_str("Ask(..)"),
        }
    }
}

/// Result of a successful `Bibliography::add`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AddOutcome {
    /// The key was free
    Inserted { key: String },
    /// The existing entry was overwritten
    Replaced { key: String },
    /// The incoming entry was stored under a new key
    Renamed { from: String, to: String },
}

impl AddOutcome {
    /// Key the entry ended up under
    pub fn key(&self) -> &str {
        match self {
            AddOutcome::Inserted { key } | AddOutcome::Replaced { key } => key,
            AddOutcome::Renamed { to, .. } => to,
        }
    }
}

/// The n-th disambiguating suffix: `a`..`z`, then `aa`, `ab`, ...
pub fn key_suffix(n: usize) -> String {
    let mut n = n + 1;
    let mut chars = Vec::new();
    while n > 0 {
        n -= 1;
        chars.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
    }
    chars.iter().rev().collect()
}

/// First `base` + suffix for which `taken` returns false
pub fn disambiguate(base: &str, taken: impl Fn(&str) -> bool) -> String {
    (0..)
        .map(|n| format!("{}{}", base, key_suffix(n)))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}
