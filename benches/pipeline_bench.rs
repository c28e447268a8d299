//! Benchmarks for the pure-Rust parts of the conversion path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use std::time::Duration;

use sdkwork_vc::audio::Resampler;
use sdkwork_vc::checkpoint::{normalize, RuntimeConfig};
use sdkwork_vc::inference::{coarse_pitch, limit_peak, resize_curve, shift_pitch};

fn config_array(len: usize) -> Vec<Value> {
    let mut values = vec![
        json!(1025),
        json!(32),
        json!(192),
        json!(192),
        json!(768),
        json!(2),
        json!(6),
        json!(3),
        json!(0),
        json!("1"),
        json!([3, 7, 11]),
        json!([[1, 3, 5], [1, 3, 5], [1, 3, 5]]),
        json!([10, 10, 2, 2]),
        json!(512),
        json!([16, 16, 4, 4]),
        json!(109),
        json!(256),
        json!(256),
        json!(40000),
    ];
    if len == 18 {
        values.remove(17);
    }
    values
}

/// Benchmark config normalization and typed decoding
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for len in [18, 19] {
        let config = config_array(len);
        group.bench_with_input(BenchmarkId::new("array", len), &config, |b, config| {
            b.iter(|| {
                let params = normalize(black_box(config), None).unwrap();
                RuntimeConfig::from_params(&params).unwrap()
            })
        });
    }
    group.finish();
}

/// Benchmark pitch post-processing over clips of increasing length
fn bench_pitch_post_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("pitch_post_processing");
    for seconds in [1usize, 10, 60] {
        let frames = seconds * 100;
        let raw: Vec<f32> = (0..frames / 2)
            .map(|i| if i % 17 == 0 { 0.0 } else { 180.0 + (i % 40) as f32 })
            .collect();
        group.bench_with_input(BenchmarkId::new("seconds", seconds), &raw, |b, raw| {
            b.iter(|| {
                let mut f0 = resize_curve(black_box(raw), frames);
                shift_pitch(&mut f0, 3);
                coarse_pitch(&f0)
            })
        });
    }
    group.finish();
}

/// Benchmark resampling to the embedder rate and the peak guard
fn bench_audio(c: &mut Criterion) {
    let mut group = c.benchmark_group("audio");
    group.measurement_time(Duration::from_secs(10));

    let source: Vec<f32> = (0..44_100 * 5)
        .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 44_100.0).sin())
        .collect();
    group.bench_function("resample_44k_to_16k_5s", |b| {
        b.iter(|| Resampler::resample(black_box(&source), 44_100, 16_000).unwrap())
    });

    group.bench_function("limit_peak_5s", |b| {
        b.iter(|| {
            let mut samples = source.clone();
            limit_peak(black_box(&mut samples), 0.99);
            samples
        })
    });
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_pitch_post_processing, bench_audio);

criterion_main!(benches);
