//! tagwire benchmarks.
//!
//! Covers:
//! - Primitive emission throughput
//! - Container round-trips at several sizes
//! - Polymorphic object blocks with supertype packets

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tagwire::{Deserializer, Schema, Serializer, Value};

use std::io::Cursor;

// ============================================================================
// Helper: Simple RNG for reproducible benchmarks
// ============================================================================

struct Rng {
    state: u64,
}

impl Rng {
    const fn new(seed: u64) -> Self {
        Self { state: if seed == 0 { 0x853c_49e6_748f_ea9b } else { seed } }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_i32(&mut self) -> i32 {
        self.next_u64() as i32
    }
}

fn empty_schema() -> Schema {
    Schema::builder().build().expect("empty schema builds")
}

fn random_list(rng: &mut Rng, len: usize) -> Value {
    Value::List(
        (0..len)
            .map(|_| match rng.next_u64() % 4 {
                0 => Value::Int(rng.next_i32()),
                1 => Value::Long(rng.next_u64() as i64),
                2 => Value::Str(format!("item_{}", rng.next_u64() % 1000)),
                _ => Value::Null,
            })
            .collect(),
    )
}

// ============================================================================
// Primitive Benchmarks
// ============================================================================

fn primitive_benchmarks(c: &mut Criterion) {
    let schema = empty_schema();
    let mut group = c.benchmark_group("primitives");

    group.throughput(Throughput::Elements(1000));
    group.bench_function("write_int_1000", |b| {
        b.iter(|| {
            let mut bytes = Vec::with_capacity(5 * 1000);
            let mut ser = Serializer::new(&mut bytes, &schema);
            for i in 0..1000 {
                ser.write_int(black_box(i)).expect("write");
            }
            bytes
        });
    });

    group.bench_function("write_str_1000", |b| {
        b.iter(|| {
            let mut bytes = Vec::new();
            let mut ser = Serializer::new(&mut bytes, &schema);
            for _ in 0..1000 {
                ser.write_str(black_box("a benchmark string")).expect("write");
            }
            bytes
        });
    });

    group.finish();
}

// ============================================================================
// Container Benchmarks
// ============================================================================

fn container_benchmarks(c: &mut Criterion) {
    let schema = empty_schema();
    let mut group = c.benchmark_group("containers");

    for len in [16, 256, 4096] {
        let mut rng = Rng::new(42);
        let value = random_list(&mut rng, len);

        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("list_write", len), &value, |b, value| {
            b.iter(|| {
                let mut bytes = Vec::new();
                let mut ser = Serializer::new(&mut bytes, &schema);
                ser.write_value(black_box(value)).expect("write");
                bytes
            });
        });

        let mut encoded = Vec::new();
        Serializer::new(&mut encoded, &schema).write_value(&value).expect("write");
        group.bench_with_input(BenchmarkId::new("list_read", len), &encoded, |b, encoded| {
            b.iter(|| {
                let mut cursor = Cursor::new(encoded.as_slice());
                let mut de = Deserializer::new(&mut cursor, &schema);
                de.read_value().expect("read")
            });
        });

        let ints: Vec<i32> = (0..len as i32).collect();
        group.bench_with_input(BenchmarkId::new("int_array_write", len), &ints, |b, ints| {
            b.iter(|| {
                let mut bytes = Vec::new();
                let mut ser = Serializer::new(&mut bytes, &schema);
                ser.write(black_box(ints)).expect("write");
                bytes
            });
        });
    }

    group.finish();
}

// ============================================================================
// Polymorphic Benchmarks
// ============================================================================

#[derive(Debug, Clone)]
struct Event {
    source: String,
}

#[derive(Debug, Clone)]
struct Click {
    event: Event,
    x: i32,
    y: i32,
}

fn polymorphic_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.define_open::<Event>("Event").write(|ser, event| ser.write_str(&event.source));
    builder
        .define::<Click>("Click")
        .extends(|click: &Click| &click.event)
        .write(|ser, click| {
            ser.write_int(click.x)?;
            ser.write_int(click.y)
        })
        .read(|de| {
            let source = de.supertype::<Event>()?.read_str()?;
            Ok(Click { event: Event { source }, x: de.read_int()?, y: de.read_int()? })
        });
    builder.build().expect("polymorphic schema builds")
}

fn polymorphic_benchmarks(c: &mut Criterion) {
    let schema = polymorphic_schema();
    let click = Click { event: Event { source: "button_7".to_owned() }, x: 320, y: 200 };
    let mut group = c.benchmark_group("polymorphic");

    group.bench_function("object_write", |b| {
        b.iter(|| {
            let mut bytes = Vec::new();
            let mut ser = Serializer::new(&mut bytes, &schema);
            ser.write(black_box(&click)).expect("write");
            bytes
        });
    });

    let mut encoded = Vec::new();
    Serializer::new(&mut encoded, &schema).write(&click).expect("write");
    group.bench_function("object_read", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(encoded.as_slice());
            let mut de = Deserializer::new(&mut cursor, &schema);
            de.read_object::<Click>().expect("read")
        });
    });

    group.finish();
}

criterion_group!(benches, primitive_benchmarks, container_benchmarks, polymorphic_benchmarks);
criterion_main!(benches);
