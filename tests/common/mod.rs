//! Common test utilities for integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use fedsync::{AggregateDocument, AggregateEntry, StatFamily, TacticKey};

/// Build a key in the given category.
pub fn key(id: &str, category: &str) -> TacticKey {
    TacticKey::new(id, category).expect("valid key")
}

/// Build a tactics-only document from `(id, category, total, successful)` rows.
pub fn tactics_doc(rows: &[(&str, &str, u64, u64)]) -> AggregateDocument {
    doc_at(Utc::now(), rows, &[])
}

/// Build a document with both families at a fixed timestamp.
pub fn doc_at(
    produced_at: DateTime<Utc>,
    tactics: &[(&str, &str, u64, u64)],
    behaviors: &[(&str, &str, u64, u64)],
) -> AggregateDocument {
    let mut doc = AggregateDocument::empty(produced_at);
    for (family, rows) in [(StatFamily::Tactics, tactics), (StatFamily::Behaviors, behaviors)] {
        for (id, category, total, successful) in rows {
            doc.insert(
                family,
                AggregateEntry::new(key(id, category), *total, *successful).expect("valid entry"),
            );
        }
    }
    doc
}

/// Initialize a test subscriber once; later calls are no-ops.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll `predicate` every 20ms until it holds or `timeout_ms` passes.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
    while std::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    predicate()
}
