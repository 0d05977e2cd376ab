//! Benchmarks for the codec engine.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bufproc::codec::{search, LzssParams, RleParams, SearchLimits};
use bufproc::{CodecEngine, CompressionSpec, RawPayload, SchemeParams};

/// Pseudo-random blocks repeated with small edits, like a programming stream.
fn structured(len: usize, block_len: usize) -> Vec<u8> {
    let mut state = 0x1234_5678u32;
    let mut block: Vec<u8> = (0..block_len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect();

    let mut data = Vec::with_capacity(len);
    let mut k = 0usize;
    while data.len() < len {
        let pos = (k * 97) % block_len;
        block[pos] ^= 0x5A;
        data.extend_from_slice(&block);
        k += 1;
    }
    data.truncate(len);
    data
}

/// Long runs of a few values, like a sparse bitmap.
fn runs(len: usize) -> Vec<u8> {
    (0..len).map(|i| if (i / 200) % 3 == 0 { 0xFF } else { 0 }).collect()
}

// -- LZSS benchmarks --

fn bench_lzss(c: &mut Criterion) {
    let mut group = c.benchmark_group("lzss");
    let engine = CodecEngine::new(1);

    let small = RawPayload::new(structured(64 * 1024, 1024), 1);
    let large = RawPayload::new(structured(1024 * 1024, 4096), 1);
    let params = SchemeParams::Lzss(LzssParams::new(12, 8).unwrap());

    group.bench_function("encode_64k", |b| {
        b.iter(|| engine.encode_with("bench", black_box(&small), params).unwrap())
    });

    group.bench_function("encode_1m", |b| {
        b.iter(|| engine.encode_with("bench", black_box(&large), params).unwrap())
    });

    let encoded = engine.encode_with("bench", &large, params).unwrap();
    group.bench_function("decode_1m", |b| {
        b.iter(|| engine.decode(black_box(&encoded)).unwrap())
    });

    group.finish();
}

// -- Parameter search benchmarks --

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(10);

    let data = structured(256 * 1024, 2048);
    group.bench_function("search_256k", |b| {
        b.iter(|| search(black_box(&data), SearchLimits::default(), 4))
    });

    let raw = RawPayload::new(data.clone(), 1);
    let engine = CodecEngine::new(4);
    group.bench_function("auto_256k", |b| {
        b.iter(|| {
            engine
                .encode("bench", black_box(&raw), &CompressionSpec::Auto(SearchLimits::default()))
                .unwrap()
        })
    });

    group.finish();
}

// -- RLE benchmarks --

fn bench_rle(c: &mut Criterion) {
    let mut group = c.benchmark_group("rle");
    let engine = CodecEngine::new(1);
    let raw = RawPayload::new(runs(256 * 1024), 1);

    for width in [1usize, 4] {
        let params = SchemeParams::Rle(RleParams::new(width).unwrap());
        group.bench_function(format!("encode_256k_w{}", width), |b| {
            b.iter(|| engine.encode_with("bench", black_box(&raw), params).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lzss, bench_search, bench_rle);
criterion_main!(benches);
