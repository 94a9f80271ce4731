use brer::history::{signature, HistoryLedger, TargetSet};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;

fn target_set(pairs: usize, seed: usize) -> TargetSet {
    (0..pairs)
        .map(|i| (format!("pair_{:03}", i), ((seed * 31 + i * 7) % 97) as f64 * 0.25))
        .collect()
}

fn build_ledger(entries: usize, pairs: usize) -> HistoryLedger {
    let mut ledger = HistoryLedger::new();
    for seed in 0..entries {
        let targets = target_set(pairs, seed);
        let alphas: HashMap<String, f64> = targets.keys().map(|k| (k.clone(), seed as f64)).collect();
        ledger.record(&alphas, &targets).unwrap();
    }
    ledger
}

fn bench_signature(c: &mut Criterion) {
    let targets = target_set(16, 3);
    c.bench_function("signature_16_pairs", |b| b.iter(|| signature(black_box(&targets))));
}

fn bench_contains(c: &mut Criterion) {
    let ledger = build_ledger(10_000, 16);
    let hit = target_set(16, 5_000);
    let miss = target_set(16, 20_000);

    let mut group = c.benchmark_group("history_contains");
    group.bench_function("hit", |b| b.iter(|| ledger.contains(black_box(&hit))));
    group.bench_function("miss", |b| b.iter(|| ledger.contains(black_box(&miss))));
    group.finish();
}

criterion_group!(benches, bench_signature, bench_contains);
criterion_main!(benches);
