//! Algebraic properties of the merge engine.

use chrono::{TimeZone, Utc};
use fedsync::services::merge::{merge, merge_all, merge_documents};
use fedsync::{AggregateDocument, AggregateEntry, StatFamily, TacticKey};
use proptest::prelude::*;

const IDS: [&str; 4] = ["flank", "kite", "burst", "retreat"];
const CATEGORIES: [&str; 2] = ["melee", "ranged"];

fn entry_strategy() -> impl Strategy<Value = (StatFamily, AggregateEntry)> {
    (
        prop_oneof![Just(StatFamily::Tactics), Just(StatFamily::Behaviors)],
        0..IDS.len(),
        0..CATEGORIES.len(),
        0u64..1_000,
    )
        .prop_flat_map(|(family, id, category, total)| {
            (Just(family), Just(id), Just(category), Just(total), 0..=total)
        })
        .prop_map(|(family, id, category, total, successful)| {
            let key = TacticKey::new(IDS[id], CATEGORIES[category]).unwrap();
            (family, AggregateEntry::new(key, total, successful).unwrap())
        })
}

fn document_strategy() -> impl Strategy<Value = AggregateDocument> {
    (
        prop::collection::vec(entry_strategy(), 0..8),
        0i64..1_000_000,
        0u32..5,
    )
        .prop_map(|(entries, offset, contributor_count)| {
            let produced_at = Utc.timestamp_opt(1_700_000_000 + offset, 0).unwrap();
            let mut doc = AggregateDocument::empty(produced_at);
            for (family, entry) in entries {
                doc.insert(family, entry);
            }
            doc.contributor_count = contributor_count;
            doc
        })
}

proptest! {
    /// Property: merge order does not matter
    #[test]
    fn prop_merge_is_commutative(a in document_strategy(), b in document_strategy()) {
        prop_assert_eq!(merge_documents(&a, &b).unwrap(), merge_documents(&b, &a).unwrap());
    }

    /// Property: grouping does not matter
    #[test]
    fn prop_merge_is_associative(
        a in document_strategy(),
        b in document_strategy(),
        c in document_strategy(),
    ) {
        let left = merge_documents(&merge_documents(&a, &b).unwrap(), &c).unwrap();
        let right = merge_documents(&a, &merge_documents(&b, &c).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    /// Property: merged totals are the sum of the inputs
    #[test]
    fn prop_merge_conserves_counts(a in document_strategy(), b in document_strategy()) {
        let merged = merge_documents(&a, &b).unwrap();
        prop_assert_eq!(merged.total_attempts(), a.total_attempts() + b.total_attempts());
        prop_assert_eq!(merged.contributor_count, a.contributor_count + b.contributor_count);

        for family in StatFamily::ALL {
            for entry in merged.family(family).values() {
                prop_assert!(entry.successful_attempts() <= entry.total_attempts());
                prop_assert!((0.0..=1.0).contains(&entry.success_rate()));
            }
        }
    }

    /// Property: the empty document with the earliest timestamp is an identity
    #[test]
    fn prop_empty_document_is_identity(a in document_strategy()) {
        let empty = AggregateDocument::empty(Utc.timestamp_opt(0, 0).unwrap());
        prop_assert_eq!(merge_documents(&a, &empty).unwrap(), a.clone());
        prop_assert_eq!(merge_documents(&empty, &a).unwrap(), a);
    }

    /// Property: merging an entry with itself keeps its rate and doubles its counts
    #[test]
    fn prop_self_merge_keeps_rate((_, entry) in entry_strategy()) {
        let doubled = merge(&entry, &entry).unwrap();
        prop_assert_eq!(doubled.total_attempts(), entry.total_attempts() * 2);
        prop_assert!((doubled.success_rate() - entry.success_rate()).abs() < 1e-12);
    }

    /// Property: folding a sequence equals pairwise merging in any order
    #[test]
    fn prop_merge_all_matches_reverse_fold(docs in prop::collection::vec(document_strategy(), 0..5)) {
        let empty = AggregateDocument::empty(Utc.timestamp_opt(0, 0).unwrap());
        let forward = merge_all(&empty, docs.iter()).unwrap();
        let backward = merge_all(&empty, docs.iter().rev()).unwrap();
        prop_assert_eq!(forward, backward);
    }
}

#[test]
fn test_weighted_average_example() {
    let key = TacticKey::new("flank", "melee").unwrap();
    let a = AggregateEntry::new(key.clone(), 100, 90).unwrap();
    let b = AggregateEntry::new(key, 10, 10).unwrap();
    let merged = merge(&a, &b).unwrap();
    assert_eq!(merged.total_attempts(), 110);
    assert_eq!(merged.successful_attempts(), 100);
    assert!((merged.success_rate() - 100.0 / 110.0).abs() < 1e-12);
}
