//! Benchmarks for report assembly.

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tripflow::core::sections::parse_sections;
use tripflow::report::{assemble_at, parse_budget};
use tripflow::testing::fixtures;

fn assembly_benchmark(c: &mut Criterion) {
    let run = fixtures::completed_run();
    let generated_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 15).unwrap();

    c.bench_function("assemble_report", |b| {
        b.iter(|| assemble_at(black_box(&run), "llama3.2:latest", generated_at))
    });

    let itinerary = fixtures::itinerary_output(7);
    c.bench_function("parse_sections", |b| {
        b.iter(|| parse_sections(black_box(&itinerary)))
    });
    c.bench_function("parse_budget", |b| {
        b.iter(|| parse_budget(black_box(&itinerary)))
    });
}

criterion_group!(benches, assembly_benchmark);
criterion_main!(benches);
