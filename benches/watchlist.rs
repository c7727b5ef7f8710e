/// Watchlist insert and resolve benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mdd_channel::watchlist::RequestIds;
use mdd_channel::{Record, StreamKind, Watchlist};
use rand::Rng;

fn populated(count: usize) -> (Watchlist, Vec<Record>) {
    let ids = RequestIds::new();
    let mut wl = Watchlist::new();
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let rec = Record::new(StreamKind::Ticker, "bloomberg", &format!("TKR{:05} US EQUITY", i), ids.next(), i as u64);
        wl.insert(rec.clone());
        records.push(rec);
    }
    (wl, records)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("watchlist_insert");

    for count in [100, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| populated(black_box(count)).0.len())
        });
    }
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("watchlist_resolve");
    let (mut wl, records) = populated(10000);
    let mut rng = rand::thread_rng();
    let picks: Vec<usize> = (0..1024).map(|_| rng.gen_range(0..records.len())).collect();

    group.bench_function("by_request_id", |b| {
        b.iter(|| {
            let mut hits = 0;
            for &i in &picks {
                let r = &records[i];
                if wl.resolve_mut(StreamKind::Ticker, r.request_id, &r.service, &r.ticker).is_some() {
                    hits += 1;
                }
            }
            hits
        })
    });

    // stale ids force the composite key fallback
    group.bench_function("by_key_fallback", |b| {
        b.iter(|| {
            let mut hits = 0;
            for &i in &picks {
                let r = &records[i];
                if wl.resolve_mut(StreamKind::Ticker, 0, &r.service, &r.ticker).is_some() {
                    hits += 1;
                }
            }
            hits
        })
    });

    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("watchlist_churn");
    let (mut wl, records) = populated(1000);

    group.bench_function("remove_reinsert", |b| {
        let mut i = 0;
        b.iter(|| {
            let r = &records[i % records.len()];
            let removed = wl.remove(StreamKind::Ticker, &r.service, &r.ticker);
            let rec = Record::new(StreamKind::Ticker, &r.service, &r.ticker, r.request_id, r.user_arg);
            wl.insert(rec);
            i += 1;
            black_box(removed)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_resolve, bench_churn);
criterion_main!(benches);
