//! Merging several bibliographies into one
//!
//! The first source is the primary: its entries are kept as they are. Entries
//! of later sources are added unless they duplicate the content of an entry
//! already merged. Keys listed in any exclude bibliography are dropped from
//! every source.

use std::collections::{HashMap, HashSet};
use std::fmt;

use bibsmith_bibtex::{is_valid_key, BibTeXEntry};
use serde::Serialize;

use crate::bibliography::Bibliography;
use crate::collision::{disambiguate, AddOutcome, CollisionPolicy};
use crate::error::{BibError, Result};
use crate::model::{ContentRule, ContentSignature};

/// Callback offered an excluded entry and the exclude file listing it
///
/// Returning a key keeps the entry under that key.
pub type RescueFn = Box<dyn FnMut(&BibTeXEntry, &str) -> Option<String>>;

pub struct MergeOptions {
    /// Which fields decide that two entries are the same record
    pub rule: ContentRule,
    /// Stop with `KeyCollision` on the first rejected collision
    pub abort_on_reject: bool,
    pub rescue_excluded: Option<RescueFn>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            rule: ContentRule::default(),
            abort_on_reject: false,
            rescue_excluded: None,
        }
    }
}

impl fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeOptions")
            .field("rule", &self.rule)
            .field("abort_on_reject", &self.abort_on_reject)
            .field("rescue_excluded", &self.rescue_excluded.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDuplicate {
    pub key: String,
    pub source: String,
    /// Key of the merged entry with the same content
    pub duplicate_of: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum CollisionOutcome {
    Replaced,
    Renamed { to: String },
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollisionRecord {
    pub key: String,
    pub source: String,
    #[serde(flatten)]
    pub outcome: CollisionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedEntry {
    pub key: String,
    pub source: String,
    pub listed_in: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RescuedEntry {
    pub from: String,
    pub to: String,
}

/// What a merge did to each entry it did not simply copy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Keys added from the non-primary sources
    pub added: Vec<String>,
    pub duplicates_skipped: Vec<SkippedDuplicate>,
    pub collisions: Vec<CollisionRecord>,
    pub excluded: Vec<ExcludedEntry>,
    pub rescued: Vec<RescuedEntry>,
}

impl MergeReport {
    pub fn rejected(&self) -> usize {
        self.collisions
            .iter()
            .filter(|c| c.outcome == CollisionOutcome::Rejected)
            .count()
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} duplicates skipped, {} key collisions ({} rejected), {} excluded, {} kept under a new key",
            self.added.len(),
            self.duplicates_skipped.len(),
            self.collisions.len(),
            self.rejected(),
            self.excluded.len(),
            self.rescued.len()
        )
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub bibliography: Bibliography,
    pub report: MergeReport,
}

/// Signature → keys of merged entries with that signature
#[derive(Default)]
struct SignatureIndex {
    keys: HashMap<ContentSignature, Vec<String>>,
}

impl SignatureIndex {
    fn insert(&mut self, signature: ContentSignature, key: &str) {
        self.keys.entry(signature).or_default().push(key.to_string());
    }

    fn remove(&mut self, signature: &ContentSignature, key: &str) {
        if let Some(keys) = self.keys.get_mut(signature) {
            if let Some(pos) = keys.iter().position(|k| k == key) {
                keys.remove(pos);
            }
            if keys.is_empty() {
                self.keys.remove(signature);
            }
        }
    }

    fn first(&self, signature: &ContentSignature) -> Option<&str> {
        self.keys
            .get(signature)
            .and_then(|keys| keys.first())
            .map(String::as_str)
    }
}

/// Merge `sources` into a new bibliography, dropping keys listed in `excludes`
pub fn merge(
    sources: &[Bibliography],
    excludes: &[Bibliography],
    policy: &mut CollisionPolicy,
    mut options: MergeOptions,
) -> Result<MergeOutcome> {
    let mut report = MergeReport::default();

    let mut excluded: HashMap<String, String> = HashMap::new();
    for exclude in excludes {
        for key in exclude.keys() {
            excluded
                .entry(key.to_string())
                .or_insert_with(|| exclude.name());
        }
    }
    let reserved: HashSet<String> = excluded.keys().cloned().collect();

    let Some((primary, rest)) = sources.split_first() else {
        return Ok(MergeOutcome {
            bibliography: Bibliography::new(),
            report,
        });
    };

    let mut output = primary_entries(primary, &excluded, &reserved, &mut options, &mut report)?;

    let mut signatures = SignatureIndex::default();
    for entry in output.entries() {
        signatures.insert(options.rule.signature(entry), &entry.cite_key);
    }

    for source in rest {
        let source_name = source.name();
        for (name, value) in source.strings() {
            output.define_string(name, value);
        }
        for preamble in source.preambles() {
            output.add_preamble(preamble);
        }

        for entry in source.iter() {
            let mut entry = entry.clone();

            if let Some(listed_in) = excluded.get(&entry.cite_key) {
                match rescue(&mut options, &entry, listed_in)? {
                    Some(requested) => {
                        let to = free_key(&requested, |k| output.contains_key(k) || reserved.contains(k));
                        tracing::info!("Keeping excluded {} as {}", entry.cite_key, to);
                        report.rescued.push(RescuedEntry {
                            from: entry.cite_key.clone(),
                            to: to.clone(),
                        });
                        entry.cite_key = to;
                    }
                    None => {
                        tracing::debug!("Excluding {} from {}", entry.cite_key, source_name);
                        report.excluded.push(ExcludedEntry {
                            key: entry.cite_key.clone(),
                            source: source_name.clone(),
                            listed_in: listed_in.clone(),
                        });
                        continue;
                    }
                }
            }

            let signature = options.rule.signature(&entry);
            if let Some(existing) = signatures.first(&signature) {
                tracing::debug!("{} duplicates {}, skipping", entry.cite_key, existing);
                report.duplicates_skipped.push(SkippedDuplicate {
                    key: entry.cite_key.clone(),
                    source: source_name.clone(),
                    duplicate_of: existing.to_string(),
                });
                continue;
            }

            let key = entry.cite_key.clone();
            let previous = output.get(&key).map(|e| options.rule.signature(e));

            match output.add_avoiding(entry, policy, &reserved) {
                Ok(AddOutcome::Inserted { key }) => {
                    signatures.insert(signature, &key);
                    report.added.push(key);
                }
                Ok(AddOutcome::Replaced { key }) => {
                    if let Some(previous) = previous {
                        signatures.remove(&previous, &key);
                    }
                    signatures.insert(signature, &key);
                    tracing::info!("Replaced {} with the entry from {}", key, source_name);
                    report.collisions.push(CollisionRecord {
                        key,
                        source: source_name.clone(),
                        outcome: CollisionOutcome::Replaced,
                    });
                }
                Ok(AddOutcome::Renamed { from, to }) => {
                    signatures.insert(signature, &to);
                    tracing::info!("Added {} from {} as {}", from, source_name, to);
                    report.added.push(to.clone());
                    report.collisions.push(CollisionRecord {
                        key: from,
                        source: source_name.clone(),
                        outcome: CollisionOutcome::Renamed { to },
                    });
                }
                Err(BibError::KeyCollision { key }) if !options.abort_on_reject => {
                    tracing::warn!("Key {} from {} already used, entry not added", key, source_name);
                    report.collisions.push(CollisionRecord {
                        key,
                        source: source_name.clone(),
                        outcome: CollisionOutcome::Rejected,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    tracing::info!("Merged {} sources: {}", sources.len(), report);
    Ok(MergeOutcome {
        bibliography: output,
        report,
    })
}

/// The primary source minus its excluded entries
fn primary_entries(
    primary: &Bibliography,
    excluded: &HashMap<String, String>,
    reserved: &HashSet<String>,
    options: &mut MergeOptions,
    report: &mut MergeReport,
) -> Result<Bibliography> {
    let source_name = primary.name();
    let mut taken: HashSet<String> = primary
        .keys()
        .filter(|k| !excluded.contains_key(*k))
        .map(str::to_string)
        .collect();

    let mut kept = Vec::with_capacity(primary.len());
    for entry in primary.iter() {
        let Some(listed_in) = excluded.get(&entry.cite_key) else {
            kept.push(entry.clone());
            continue;
        };
        match rescue(options, entry, listed_in)? {
            Some(requested) => {
                let to = free_key(&requested, |k| taken.contains(k) || reserved.contains(k));
                tracing::info!("Keeping excluded {} as {}", entry.cite_key, to);
                report.rescued.push(RescuedEntry {
                    from: entry.cite_key.clone(),
                    to: to.clone(),
                });
                taken.insert(to.clone());
                let mut entry = entry.clone();
                entry.cite_key = to;
                kept.push(entry);
            }
            None => {
                tracing::debug!("Excluding {} from {}", entry.cite_key, source_name);
                report.excluded.push(ExcludedEntry {
                    key: entry.cite_key.clone(),
                    source: source_name.clone(),
                    listed_in: listed_in.clone(),
                });
            }
        }
    }

    let (mut output, warnings) = Bibliography::from_entries(kept);
    for warning in warnings {
        tracing::warn!("{}: {}", source_name, warning);
    }
    for (name, value) in primary.strings() {
        output.define_string(name, value);
    }
    for preamble in primary.preambles() {
        output.add_preamble(preamble);
    }
    Ok(output)
}

/// The key an excluded entry is kept under, if the callback keeps it
fn rescue(
    options: &mut MergeOptions,
    entry: &BibTeXEntry,
    listed_in: &str,
) -> Result<Option<String>> {
    let Some(callback) = options.rescue_excluded.as_mut() else {
        return Ok(None);
    };
    let Some(requested) = callback(entry, listed_in) else {
        return Ok(None);
    };
    let requested = requested.trim();
    if requested.is_empty() || requested == entry.cite_key {
        return Ok(None);
    }
    if !is_valid_key(requested) {
        return Err(BibError::InvalidEntry(format!(
            "\"{requested}\" is not a usable key for \"{}\"",
            entry.cite_key
        )));
    }
    Ok(Some(requested.to_string()))
}

fn free_key(requested: &str, taken: impl Fn(&str) -> bool) -> String {
    if taken(requested) {
        disambiguate(requested, taken)
    } else {
        requested.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Resolution;
    use bibsmith_bibtex::BibTeXEntryType;

    fn article(key: &str, title: &str) -> BibTeXEntry {
        BibTeXEntry::new(key, BibTeXEntryType::Article)
            .with_field("author", "Smith, J.")
            .with_field("title", title)
            .with_field("year", "2020")
    }

    fn bib(name: &str, entries: Vec<BibTeXEntry>) -> Bibliography {
        let mut b = Bibliography::from_entries(entries).0;
        b.set_origin(name);
        b
    }

    #[test]
    fn test_merge_no_sources() {
        let outcome = merge(&[], &[], &mut CollisionPolicy::Reject, MergeOptions::default()).unwrap();
        assert!(outcome.bibliography.is_empty());
        assert_eq!(outcome.report, MergeReport::default());
    }

    #[test]
    fn test_replace_updates_signature_index() {
        let first = bib("a.bib", vec![article("k", "Old")]);
        let second = bib("b.bib", vec![article("k", "New")]);
        let third = bib("c.bib", vec![article("other", "Old")]);

        let outcome = merge(
            &[first, second, third],
            &[],
            &mut CollisionPolicy::Replace,
            MergeOptions::default(),
        )
        .unwrap();

        // "Old" was replaced, so its twin in c.bib is not a duplicate any more
        assert_eq!(outcome.bibliography.keys().collect::<Vec<_>>(), vec!["k", "other"]);
        assert!(outcome.report.duplicates_skipped.is_empty());
    }

    #[test]
    fn test_reject_continues_or_aborts() {
        let sources = [
            bib("a.bib", vec![article("k", "One")]),
            bib("b.bib", vec![article("k", "Two"), article("m", "Three")]),
        ];

        let outcome = merge(&sources, &[], &mut CollisionPolicy::Reject, MergeOptions::default()).unwrap();
        assert_eq!(outcome.report.rejected(), 1);
        assert_eq!(outcome.report.added, vec!["m".to_string()]);

        let options = MergeOptions {
            abort_on_reject: true,
            ..MergeOptions::default()
        };
        let err = merge(&sources, &[], &mut CollisionPolicy::Reject, options).unwrap_err();
        assert!(matches!(err, BibError::KeyCollision { ref key } if key == "k"));
    }

    #[test]
    fn test_ask_abort_stops_merge() {
        let sources = [
            bib("a.bib", vec![article("k", "One")]),
            bib("b.bib", vec![article("k", "Two")]),
        ];
        let mut policy = CollisionPolicy::ask(|_: &BibTeXEntry, _: &BibTeXEntry| Resolution::Abort);
        let err = merge(&sources, &[], &mut policy, MergeOptions::default()).unwrap_err();
        assert!(matches!(err, BibError::Aborted { .. }));
    }

    #[test]
    fn test_rescue_under_unreadable_key_fails() {
        let sources = [
            bib("a.bib", vec![article("a", "One")]),
            bib("b.bib", vec![article("gone", "Two")]),
        ];
        let excludes = [bib("skip.bib", vec![article("gone", "whatever")])];
        let options = MergeOptions {
            rescue_excluded: Some(Box::new(|_: &BibTeXEntry, _: &str| Some("gone again".to_string()))),
            ..MergeOptions::default()
        };

        let err = merge(&sources, &excludes, &mut CollisionPolicy::Reject, options).unwrap_err();
        assert!(matches!(err, BibError::InvalidEntry(_)));
    }

    #[test]
    fn test_rescue_excluded_entry() {
        let sources = [bib("a.bib", vec![article("gone", "One"), article("kept", "Two")])];
        let excludes = [bib("skip.bib", vec![article("gone", "whatever")])];
        let options = MergeOptions {
            rescue_excluded: Some(Box::new(|entry: &BibTeXEntry, listed_in: &str| {
                assert_eq!((entry.cite_key.as_str(), listed_in), ("gone", "skip.bib"));
                Some("kept".to_string())
            })),
            ..MergeOptions::default()
        };

        let outcome = merge(&sources, &excludes, &mut CollisionPolicy::Reject, options).unwrap();
        assert_eq!(outcome.bibliography.keys().collect::<Vec<_>>(), vec!["kepta", "kept"]);
        assert_eq!(
            outcome.report.rescued,
            vec![RescuedEntry { from: "gone".into(), to: "kepta".into() }]
        );
    }

    #[test]
    fn test_report_serializes() {
        let report = MergeReport {
            collisions: vec![CollisionRecord {
                key: "k".into(),
                source: "b.bib".into(),
                outcome: CollisionOutcome::Renamed { to: "ka".into() },
            }],
            ..MergeReport::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["collisions"][0]["resolution"], "renamed");
        assert_eq!(json["collisions"][0]["to"], "ka");
    }
}
