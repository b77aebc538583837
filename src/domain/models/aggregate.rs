//! Aggregate statistics value types.
//!
//! These are the only shapes that ever leave a contributor: a key naming a
//! statistic bucket and the accumulated counts for it. Nothing here carries
//! contributor or end-user identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::errors::{DomainError, DomainResult};

/// Success rate reported for a bucket that has no attempts yet.
pub const NEUTRAL_SUCCESS_RATE: f64 = 0.5;

/// Identifies a statistic bucket by tactic id and category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawTacticKey")]
pub struct TacticKey {
    tactic_id: String,
    category: String,
}

#[derive(Deserialize)]
struct RawTacticKey {
    tactic_id: String,
    #[serde(default)]
    category: String,
}

impl TryFrom<RawTacticKey> for TacticKey {
    type Error = DomainError;

    fn try_from(raw: RawTacticKey) -> Result<Self, Self::Error> {
        Self::new(raw.tactic_id, raw.category)
    }
}

impl TacticKey {
    /// Create a key, rejecting an empty tactic id.
    pub fn new(tactic_id: impl Into<String>, category: impl Into<String>) -> DomainResult<Self> {
        let tactic_id = tactic_id.into();
        if tactic_id.trim().is_empty() {
            return Err(DomainError::InvalidKey("tactic id cannot be empty".to_string()));
        }
        Ok(Self {
            tactic_id,
            category: category.into(),
        })
    }

    pub fn tactic_id(&self) -> &str {
        &self.tactic_id
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

impl fmt::Display for TacticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.tactic_id)
    }
}

/// Which statistic family a bucket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatFamily {
    /// Combat tactics, keyed by tactic id and category.
    Tactics,
    /// Behaviors, keyed by behavior id and mob type.
    Behaviors,
}

impl StatFamily {
    pub const ALL: [Self; 2] = [Self::Tactics, Self::Behaviors];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tactics => "tactics",
            Self::Behaviors => "behaviors",
        }
    }
}

/// Accumulated outcome counts for one bucket.
///
/// `successful_attempts <= total_attempts` holds for every value of this
/// type; the success rate is always derived from the counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAggregateEntry")]
pub struct AggregateEntry {
    key: TacticKey,
    total_attempts: u64,
    successful_attempts: u64,
    success_rate: f64,
}

/// Wire shape of an entry. A received `success_rate` is ignored and
/// recomputed from the counts.
#[derive(Deserialize)]
struct RawAggregateEntry {
    key: TacticKey,
    total_attempts: u64,
    successful_attempts: u64,
    #[serde(default)]
    #[allow(dead_code)]
    success_rate: Option<f64>,
}

impl TryFrom<RawAggregateEntry> for AggregateEntry {
    type Error = DomainError;

    fn try_from(raw: RawAggregateEntry) -> Result<Self, Self::Error> {
        Self::new(raw.key, raw.total_attempts, raw.successful_attempts)
    }
}

impl AggregateEntry {
    /// Create an entry from raw counts.
    pub fn new(key: TacticKey, total_attempts: u64, successful_attempts: u64) -> DomainResult<Self> {
        if successful_attempts > total_attempts {
            return Err(DomainError::InvalidEntry {
                key: key.to_string(),
                successful: successful_attempts,
                total: total_attempts,
            });
        }
        Ok(Self {
            key,
            total_attempts,
            successful_attempts,
            success_rate: derive_rate(successful_attempts, total_attempts),
        })
    }

    /// An entry with no attempts and the neutral prior rate.
    pub fn empty(key: TacticKey) -> Self {
        Self {
            key,
            total_attempts: 0,
            successful_attempts: 0,
            success_rate: NEUTRAL_SUCCESS_RATE,
        }
    }

    /// Return a copy with one more attempt recorded.
    pub fn with_outcome(&self, success: bool) -> Self {
        let total_attempts = self.total_attempts.saturating_add(1);
        let successful_attempts = if success {
            self.successful_attempts.saturating_add(1)
        } else {
            self.successful_attempts
        };
        Self {
            key: self.key.clone(),
            total_attempts,
            successful_attempts,
            success_rate: derive_rate(successful_attempts, total_attempts),
        }
    }

    /// Remove the counts of `other` from this entry.
    ///
    /// Used to retire a batch that was taken from this entry earlier; counts
    /// only ever grow in between, so the subtraction saturates at zero only
    /// if a caller passes an unrelated batch.
    pub(crate) fn minus(&self, other: &Self) -> Self {
        let total_attempts = self.total_attempts.saturating_sub(other.total_attempts);
        let successful_attempts = self
            .successful_attempts
            .saturating_sub(other.successful_attempts)
            .min(total_attempts);
        Self {
            key: self.key.clone(),
            total_attempts,
            successful_attempts,
            success_rate: derive_rate(successful_attempts, total_attempts),
        }
    }

    pub fn key(&self) -> &TacticKey {
        &self.key
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    pub fn successful_attempts(&self) -> u64 {
        self.successful_attempts
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    pub fn is_empty(&self) -> bool {
        self.total_attempts == 0
    }
}

#[allow(clippy::cast_precision_loss)]
fn derive_rate(successful: u64, total: u64) -> f64 {
    if total == 0 {
        NEUTRAL_SUCCESS_RATE
    } else {
        successful as f64 / total as f64
    }
}

/// Entries of one statistic family, keyed by bucket.
pub type EntryMap = BTreeMap<TacticKey, AggregateEntry>;

/// A transferable set of aggregates for both statistic families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDocument {
    #[serde(with = "entry_list", default)]
    pub tactics: EntryMap,
    #[serde(with = "entry_list", default)]
    pub behaviors: EntryMap,
    pub produced_at: DateTime<Utc>,
    /// Number of contributions folded into this document (coordinator side).
    #[serde(default)]
    pub contributor_count: u32,
}

impl AggregateDocument {
    /// An empty document stamped with `produced_at`.
    pub fn empty(produced_at: DateTime<Utc>) -> Self {
        Self {
            tactics: EntryMap::new(),
            behaviors: EntryMap::new(),
            produced_at,
            contributor_count: 0,
        }
    }

    pub fn family(&self, family: StatFamily) -> &EntryMap {
        match family {
            StatFamily::Tactics => &self.tactics,
            StatFamily::Behaviors => &self.behaviors,
        }
    }

    pub fn family_mut(&mut self, family: StatFamily) -> &mut EntryMap {
        match family {
            StatFamily::Tactics => &mut self.tactics,
            StatFamily::Behaviors => &mut self.behaviors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tactics.is_empty() && self.behaviors.is_empty()
    }

    /// Sum of attempts across every bucket of both families.
    pub fn total_attempts(&self) -> u64 {
        self.tactics
            .values()
            .chain(self.behaviors.values())
            .map(AggregateEntry::total_attempts)
            .sum()
    }

    /// Insert an entry under its own key, replacing any previous entry.
    pub fn insert(&mut self, family: StatFamily, entry: AggregateEntry) {
        self.family_mut(family).insert(entry.key().clone(), entry);
    }
}

/// Serializes an [`EntryMap`] as a JSON array of entries.
///
/// Struct keys cannot be JSON object keys, and every entry already carries
/// its key. A duplicated key in a received array is rejected.
mod entry_list {
    use super::{AggregateEntry, EntryMap};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(map: &EntryMap, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<EntryMap, D::Error> {
        let entries = Vec::<AggregateEntry>::deserialize(deserializer)?;
        let mut map = EntryMap::new();
        for entry in entries {
            let key = entry.key().clone();
            if map.insert(key.clone(), entry).is_some() {
                return Err(D::Error::custom(format!(
                    "duplicate key in aggregate document: {key}"
                )));
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> TacticKey {
        TacticKey::new(id, "melee").unwrap()
    }

    #[test]
    fn test_empty_entry_has_neutral_rate() {
        let entry = AggregateEntry::empty(key("flank"));
        assert_eq!(entry.total_attempts(), 0);
        assert!((entry.success_rate() - NEUTRAL_SUCCESS_RATE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_more_successes_than_attempts() {
        let result = AggregateEntry::new(key("flank"), 3, 4);
        assert!(matches!(result, Err(DomainError::InvalidEntry { successful: 4, total: 3, .. })));
    }

    #[test]
    fn test_rejects_empty_tactic_id() {
        assert!(matches!(TacticKey::new("  ", "melee"), Err(DomainError::InvalidKey(_))));
    }

    #[test]
    fn test_with_outcome_updates_rate() {
        let entry = AggregateEntry::empty(key("flank"))
            .with_outcome(true)
            .with_outcome(true)
            .with_outcome(false);
        assert_eq!(entry.total_attempts(), 3);
        assert_eq!(entry.successful_attempts(), 2);
        assert!((entry.success_rate() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_minus_retires_batch() {
        let full = AggregateEntry::new(key("flank"), 10, 7).unwrap();
        let batch = AggregateEntry::new(key("flank"), 4, 3).unwrap();
        let rest = full.minus(&batch);
        assert_eq!(rest.total_attempts(), 6);
        assert_eq!(rest.successful_attempts(), 4);
    }

    #[test]
    fn test_document_serializes_entries_as_array() {
        let mut doc = AggregateDocument::empty(Utc::now());
        doc.insert(StatFamily::Tactics, AggregateEntry::new(key("flank"), 4, 1).unwrap());

        let json = serde_json::to_value(&doc).unwrap();
        let tactics = json["tactics"].as_array().unwrap();
        assert_eq!(tactics.len(), 1);
        assert_eq!(tactics[0]["key"]["tactic_id"], "flank");
        assert_eq!(tactics[0]["success_rate"], 0.25);

        let back: AggregateDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_deserialize_recomputes_rate() {
        let json = r#"{
            "key": {"tactic_id": "flank", "category": "melee"},
            "total_attempts": 4,
            "successful_attempts": 2,
            "success_rate": 0.99
        }"#;
        let entry: AggregateEntry = serde_json::from_str(json).unwrap();
        assert!((entry.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deserialize_rejects_invalid_counts() {
        let json = r#"{
            "key": {"tactic_id": "flank", "category": "melee"},
            "total_attempts": 1,
            "successful_attempts": 2
        }"#;
        assert!(serde_json::from_str::<AggregateEntry>(json).is_err());
    }

    #[test]
    fn test_deserialize_rejects_duplicate_keys() {
        let json = r#"{
            "tactics": [
                {"key": {"tactic_id": "flank", "category": "melee"}, "total_attempts": 1, "successful_attempts": 1},
                {"key": {"tactic_id": "flank", "category": "melee"}, "total_attempts": 2, "successful_attempts": 0}
            ],
            "produced_at": "2024-01-01T00:00:00Z"
        }"#;
        let err = serde_json::from_str::<AggregateDocument>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn test_missing_behaviors_section_defaults_to_empty() {
        let json = r#"{"tactics": [], "produced_at": "2024-01-01T00:00:00Z"}"#;
        let doc: AggregateDocument = serde_json::from_str(json).unwrap();
        assert!(doc.behaviors.is_empty());
        assert_eq!(doc.contributor_count, 0);
    }
}
