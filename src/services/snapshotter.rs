//! Aggregate snapshotter.
//!
//! Moves statistics between an [`OutcomeRecorder`] and the transferable
//! [`AggregateDocument`] form, and owns the JSON codec used on every wire
//! and file surface.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AggregateDocument, AggregateEntry, EntryMap, RemoteSnapshot};
use crate::services::outcome_recorder::{OutcomeRecorder, SnapshotApplication};

/// The recorder's pending delta as a contribution, or `None` if nothing new
/// was recorded.
pub fn contribution(recorder: &OutcomeRecorder, now: DateTime<Utc>) -> Option<AggregateDocument> {
    let batch = recorder.take_batch(now);
    if batch.is_empty() {
        None
    } else {
        Some(batch)
    }
}

/// Merge a received global snapshot into the recorder's view.
///
/// Local outcomes are never replaced: the snapshot only becomes the new
/// baseline beneath them, and only if it is newer than the current one.
pub fn absorb(recorder: &OutcomeRecorder, snapshot: RemoteSnapshot) -> SnapshotApplication {
    let data_points = snapshot.document.total_attempts();
    let result = recorder.apply_snapshot(snapshot);
    match result {
        SnapshotApplication::Applied { round_number } => {
            info!(round_number, data_points, "applied global snapshot");
        }
        SnapshotApplication::Stale {
            round_number,
            baseline_round,
        } => {
            debug!(round_number, baseline_round, "ignored stale snapshot");
        }
    }
    result
}

/// Serialize a document as pretty JSON.
pub fn encode_document(document: &AggregateDocument) -> DomainResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(document)?)
}

/// Parse a document. Any invariant violation makes the whole document invalid.
pub fn decode_document(bytes: &[u8]) -> DomainResult<AggregateDocument> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Serialize one statistic family as a JSON array of entries.
pub fn encode_entries(entries: &EntryMap) -> DomainResult<Vec<u8>> {
    let list: Vec<&AggregateEntry> = entries.values().collect();
    Ok(serde_json::to_vec_pretty(&list)?)
}

/// Parse a JSON array of entries, rejecting duplicate keys.
pub fn decode_entries(bytes: &[u8]) -> DomainResult<EntryMap> {
    let list: Vec<AggregateEntry> = serde_json::from_slice(bytes)?;
    let mut entries = EntryMap::new();
    for entry in list {
        let key = entry.key().clone();
        if entries.insert(key.clone(), entry).is_some() {
            return Err(DomainError::DuplicateKey(key.to_string()));
        }
    }
    Ok(entries)
}
