//! Merge engine.
//!
//! Combines aggregates by sample weight. Raw integer counts are summed, so the
//! merged success rate is exactly the attempt-weighted average of the inputs
//! and merging is commutative and associative without rounding drift.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AggregateDocument, AggregateEntry, EntryMap, StatFamily};

/// Merge two entries for the same key.
pub fn merge(a: &AggregateEntry, b: &AggregateEntry) -> DomainResult<AggregateEntry> {
    if a.key() != b.key() {
        return Err(DomainError::KeyMismatch {
            left: a.key().to_string(),
            right: b.key().to_string(),
        });
    }
    if a.total_attempts() == 0 && b.total_attempts() == 0 {
        return Ok(AggregateEntry::empty(a.key().clone()));
    }
    AggregateEntry::new(
        a.key().clone(),
        a.total_attempts().saturating_add(b.total_attempts()),
        a.successful_attempts().saturating_add(b.successful_attempts()),
    )
}

/// Merge two entry maps: union of keys, shared keys merged.
pub fn merge_entries(a: &EntryMap, b: &EntryMap) -> DomainResult<EntryMap> {
    let mut merged = a.clone();
    for (key, entry) in b {
        let combined = match merged.get(key) {
            Some(existing) => merge(existing, entry)?,
            None => entry.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    Ok(merged)
}

/// Merge two documents into a new one. Neither input is modified.
pub fn merge_documents(a: &AggregateDocument, b: &AggregateDocument) -> DomainResult<AggregateDocument> {
    let mut merged = AggregateDocument::empty(a.produced_at.max(b.produced_at));
    for family in StatFamily::ALL {
        *merged.family_mut(family) = merge_entries(a.family(family), b.family(family))?;
    }
    merged.contributor_count = a.contributor_count.saturating_add(b.contributor_count);
    Ok(merged)
}

/// Merge a sequence of documents, starting from `base`.
pub fn merge_all<'a>(
    base: &AggregateDocument,
    docs: impl IntoIterator<Item = &'a AggregateDocument>,
) -> DomainResult<AggregateDocument> {
    docs.into_iter()
        .try_fold(base.clone(), |acc, doc| merge_documents(&acc, doc))
}
