/// Decode and message rebuild benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mdd_channel::{
    Decoder, Event, EventKind, FieldType, FieldValue, LinkState, Message, RawEvent, RawField, Schema, SchemaEntry,
};
use std::sync::Arc;

fn quote(seq: usize, width: usize) -> RawEvent {
    let fields: Vec<RawField> = (0..width)
        .map(|i| RawField::new(i as i32 + 1, FieldValue::Double(100.0 + seq as f64 * 0.01), FieldType::Double))
        .collect();
    RawEvent::update(1_704_189_600.0 + seq as f64, seq as u32 + 1, "bloomberg", "IBM US EQUITY", &fields)
}

fn schema(width: usize) -> Arc<Schema> {
    let entries = (0..width).map(|i| SchemaEntry::new(i as i32 + 1, format!("FLD_{}", i + 1), Some(FieldType::Double)));
    Arc::new(Schema::from_entries(entries))
}

fn bench_decode_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_throughput");

    for msg_count in [1000, 10000].iter() {
        let events: Vec<RawEvent> = (0..*msg_count).map(|seq| quote(seq, 8)).collect();
        group.throughput(Throughput::Elements(*msg_count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(msg_count), msg_count, |b, _| {
            b.iter(|| {
                let mut count = 0;
                for raw in events.iter() {
                    if Decoder::decode(black_box(raw.clone())).is_ok() {
                        count += 1;
                    }
                }
                count
            });
        });
    }
    group.finish();
}

fn bench_update_width(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_width");

    for width in [4, 32, 128].iter() {
        let raw = quote(42, *width);
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, _| {
            b.iter(|| Decoder::decode(black_box(raw.clone())))
        });
    }
    group.finish();
}

fn bench_event_kinds(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_kinds");

    let update = quote(1, 8);
    let status = RawEvent::status(EventKind::Status, 1.0, 7, "bloomberg", "IBM", "Unknown ticker");
    let symbol = RawEvent::symbol(1.0, 9, "bloomberg", "INDEX", "IBM US EQUITY");
    let service = RawEvent::service(LinkState::Down, "bloomberg");

    group.bench_function("update", |b| b.iter(|| Decoder::decode(black_box(update.clone()))));
    group.bench_function("status", |b| b.iter(|| Decoder::decode(black_box(status.clone()))));
    group.bench_function("symbol", |b| b.iter(|| Decoder::decode(black_box(symbol.clone()))));
    group.bench_function("service", |b| b.iter(|| Decoder::decode(black_box(service.clone()))));

    group.finish();
}

fn bench_message_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_rebuild");

    for width in [8, 128].iter() {
        let Ok(Event::Update { header, fields, .. }) = Decoder::decode(quote(7, *width)) else {
            panic!("update did not decode");
        };
        let mut msg = Message::new(schema(*width));

        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, _| {
            b.iter(|| {
                msg.set_data(
                    &header.service,
                    &header.ticker,
                    0,
                    header.update_time,
                    black_box(fields.iter().cloned()),
                );
                msg.num_fields()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_decode_throughput,
    bench_update_width,
    bench_event_kinds,
    bench_message_rebuild
);
criterion_main!(benches);
