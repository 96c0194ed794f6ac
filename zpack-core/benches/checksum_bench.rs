//! Throughput benchmarks for the checksum units.
//!
//! Covers CRC-32 and Adler-32 across data sizes, data patterns, and
//! incremental vs single-shot use.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use zpack_core::adler::Adler32;
use zpack_core::crc::Crc32;

mod test_data {
    /// Pseudo-random bytes from a fixed-seed LCG.
    pub fn random(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut seed: u64 = 0x123456789ABCDEF0;
        for _ in 0..size {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((seed >> 32) as u8);
        }
        data
    }

    pub fn zeros(size: usize) -> Vec<u8> {
        vec![0; size]
    }

    pub fn text_like(size: usize) -> Vec<u8> {
        b"The quick brown fox jumps over the lazy dog. "
            .iter()
            .copied()
            .cycle()
            .take(size)
            .collect()
    }
}

const SIZES: [(&str, usize); 5] = [
    ("16B", 16),
    ("256B", 256),
    ("4KB", 4 * 1024),
    ("64KB", 64 * 1024),
    ("1MB", 1024 * 1024),
];

fn bench_crc32_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32_sizes");

    for (size_name, size) in SIZES {
        let data = test_data::text_like(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size_name), &data, |b, data| {
            b.iter(|| black_box(Crc32::compute(black_box(data))));
        });
    }

    group.finish();
}

fn bench_adler32_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("adler32_sizes");

    for (size_name, size) in SIZES {
        let data = test_data::text_like(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size_name), &data, |b, data| {
            b.iter(|| black_box(Adler32::checksum(black_box(data))));
        });
    }

    group.finish();
}

fn bench_patterns(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum_patterns");
    let size = 64 * 1024;

    let patterns: [(&str, fn(usize) -> Vec<u8>); 3] = [
        ("random", test_data::random),
        ("zeros", test_data::zeros),
        ("text", test_data::text_like),
    ];

    for (name, generator) in patterns {
        let data = generator(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("crc32", name), &data, |b, data| {
            b.iter(|| black_box(Crc32::compute(black_box(data))));
        });
        group.bench_with_input(BenchmarkId::new("adler32", name), &data, |b, data| {
            b.iter(|| black_box(Adler32::checksum(black_box(data))));
        });
    }

    group.finish();
}

fn bench_crc32_incremental(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32_incremental");

    let size = 64 * 1024;
    let data = test_data::text_like(size);

    for chunk_size in [256, 1024, 4096, 16384] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("chunks_{}", chunk_size)),
            &data,
            |b, data| {
                b.iter(|| {
                    let mut crc = Crc32::new();
                    for chunk in data.chunks(chunk_size) {
                        crc.update(black_box(chunk));
                    }
                    black_box(crc.finalize())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_crc32_sizes,
    bench_adler32_sizes,
    bench_patterns,
    bench_crc32_incremental
);
criterion_main!(benches);
