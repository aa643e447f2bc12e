use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bale_capture_core::{check_character, normalize, validate, Platform, ScanSource, Symbology};

const SOURCE: ScanSource = ScanSource::new(Symbology::Code39, Platform::Android);

fn bench_check_character(c: &mut Criterion) {
    c.bench_function("check_character", |b| {
        b.iter(|| check_character(black_box("KX-2024.7")))
    });
}

fn bench_normalize_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_validate");

    group.bench_function("valid", |b| {
        b.iter(|| validate(&normalize(black_box("*1234567892*"), SOURCE)))
    });
    group.bench_function("checksum_mismatch", |b| {
        b.iter(|| validate(&normalize(black_box("*1234567891*"), SOURCE)))
    });
    group.bench_function("wrong_length", |b| {
        b.iter(|| validate(&normalize(black_box("*0123456789012*"), SOURCE)))
    });

    group.finish();
}

criterion_group!(benches, bench_check_character, bench_normalize_validate);
criterion_main!(benches);
