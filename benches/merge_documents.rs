use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fedsync::services::merge::{merge_all, merge_documents};
use fedsync::{AggregateDocument, AggregateEntry, StatFamily, TacticKey};

fn document(entries: usize, offset: usize) -> AggregateDocument {
    let produced_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let mut doc = AggregateDocument::empty(produced_at);
    for i in 0..entries {
        let id = format!("tactic-{}", (i + offset) % (entries * 2));
        let key = TacticKey::new(id, format!("category-{}", i % 8)).unwrap();
        let total = (i as u64 % 50) + 1;
        let entry = AggregateEntry::new(key, total, total / 2).unwrap();
        let family = if i % 4 == 0 {
            StatFamily::Behaviors
        } else {
            StatFamily::Tactics
        };
        doc.insert(family, entry);
    }
    doc
}

fn bench_merge_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_documents");
    for &entries in &[100usize, 1_000, 10_000] {
        let a = document(entries, 0);
        let b = document(entries, entries / 2);
        group.bench_with_input(BenchmarkId::from_parameter(entries), &(a, b), |bench, (a, b)| {
            bench.iter(|| black_box(merge_documents(black_box(a), black_box(b)).unwrap()));
        });
    }
    group.finish();
}

fn bench_merge_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_all");
    let base = document(1_000, 0);
    for &contributors in &[10usize, 50] {
        let docs: Vec<_> = (0..contributors).map(|n| document(200, n * 37)).collect();
        group.bench_with_input(
            BenchmarkId::new("contributors", contributors),
            &docs,
            |bench, docs| {
                bench.iter(|| black_box(merge_all(&base, docs.iter()).unwrap()));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_merge_pair, bench_merge_round);
criterion_main!(benches);
