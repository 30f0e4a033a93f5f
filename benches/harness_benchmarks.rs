#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use zscore::{sandbox, xml, Harness};

const TWINKLE: &str = include_str!("../tests/fixtures/twinkle.score");

fn bench_sandbox(c: &mut Criterion) {
    c.bench_function("sandbox_check", |b| {
        b.iter(|| sandbox::check(black_box(TWINKLE)).unwrap())
    });
}

fn bench_run(c: &mut Criterion) {
    let harness = Harness::with_defaults().unwrap();

    c.bench_function("harness_run", |b| {
        b.iter(|| harness.run(black_box(TWINKLE)).unwrap())
    });
}

fn bench_translate(c: &mut Criterion) {
    let document = Harness::with_defaults().unwrap().run(TWINKLE).unwrap().to_xml();

    c.bench_function("xml_to_script", |b| {
        b.iter(|| xml::to_script(black_box(&document)).unwrap())
    });
}

criterion_group!(benches, bench_sandbox, bench_run, bench_translate);
criterion_main!(benches);
