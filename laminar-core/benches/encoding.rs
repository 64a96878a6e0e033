use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use laminar_core::{Endianness, Message, MetaField, OpcodeTable, Scalar, Schema, Value, Vector};
use std::sync::Arc;

fn sample_schema() -> Arc<Schema> {
    let len = Scalar::u32(0);
    Schema::builder("Sample")
        .endianness(Endianness::Big)
        .field("id", Scalar::u64(42))
        .field("len", len.clone())
        .field("data", Vector::new(&len, Scalar::u16(0)))
        .build()
        .unwrap()
}

fn framed(body: &Arc<Schema>) -> Arc<Schema> {
    let table = OpcodeTable::new([(body.clone(), 1)]).unwrap();
    Schema::builder("Frame")
        .endianness(Endianness::Big)
        .field("opcode", MetaField::opcode(Scalar::u8(0), table).unwrap())
        .field("length", MetaField::inclusive_length(Scalar::u32(0)))
        .build()
        .unwrap()
}

fn items(count: usize) -> Value {
    Value::from((0..count).map(|i| i as u16).collect::<Vec<_>>())
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let schema = sample_schema();

    for count in [16, 256, 4096] {
        let mut s = schema.instance();
        s.set("data", items(count)).unwrap();

        group.throughput(Throughput::Bytes(s.size() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &s, |b, s| {
            b.iter(|| black_box(s).encode().unwrap());
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let schema = sample_schema();

    for count in [16, 256, 4096] {
        let mut s = schema.instance();
        s.set("data", items(count)).unwrap();
        let encoded = s.encode().unwrap();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &encoded, |b, data| {
            b.iter(|| schema.decode(black_box(data)).unwrap());
        });
    }

    group.finish();
}

fn bench_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("message");
    let body = sample_schema();
    let header = framed(&body);

    for count in [16, 256, 4096] {
        let mut s = body.instance();
        s.set("data", items(count)).unwrap();
        let message = (header.instance() / s.clone()).unwrap();
        let encoded = message.encode().unwrap();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::new("compose", count), &s, |b, s| {
            b.iter(|| (header.instance() / s.clone()).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("from_bytes", count), &encoded, |b, data| {
            b.iter(|| Message::from_bytes(&header, black_box(data), &[]).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_message);
criterion_main!(benches);
