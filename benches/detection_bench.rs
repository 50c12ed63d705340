//! Performance benchmarks for tempo detection

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cadence_dsp::config::PreprocessParams;
use cadence_dsp::detectors::default_registry;
use cadence_dsp::preprocessing::process;
use cadence_dsp::{analyze_window, AudioFrame, DetectionContext};

/// Synthetic 128 BPM beat (10 seconds at 44.1 kHz)
fn beat_signal() -> Vec<f32> {
    let sample_rate = 44100u32;
    let period = (60.0 / 128.0 * sample_rate as f32) as usize;
    (0..sample_rate as usize * 10)
        .map(|i| {
            let phase = (i % period) as f32 / sample_rate as f32;
            let env = (-phase * 30.0).exp();
            env * (2.0 * std::f32::consts::PI * 80.0 * i as f32 / sample_rate as f32).sin()
        })
        .collect()
}

fn bench_preprocess(c: &mut Criterion) {
    let samples = beat_signal();
    let ctx = DetectionContext::new(44100, 60.0, 200.0, 10.0).unwrap();
    let params = PreprocessParams::default();
    let frames = vec![AudioFrame::new(samples, 44100, 0)];

    c.bench_function("preprocess_10s", |b| {
        b.iter(|| process(black_box(&frames), black_box(&ctx), black_box(&params)));
    });
}

fn bench_detectors(c: &mut Criterion) {
    let samples = beat_signal();
    let ctx = DetectionContext::new(44100, 60.0, 200.0, 10.0).unwrap();
    let frames = vec![AudioFrame::new(samples, 44100, 0)];
    let signal = process(&frames, &ctx, &PreprocessParams::default());

    let mut group = c.benchmark_group("detectors");
    for detector in default_registry(true) {
        group.bench_function(detector.name(), |b| {
            b.iter(|| detector.analyze(black_box(&signal), black_box(&ctx)));
        });
    }
    group.finish();
}

fn bench_full_cycle(c: &mut Criterion) {
    let samples = beat_signal();
    let ctx = DetectionContext::new(44100, 60.0, 200.0, 10.0).unwrap();

    c.bench_function("analyze_window_10s", |b| {
        b.iter(|| analyze_window(black_box(&samples), black_box(&ctx)));
    });
}

criterion_group!(benches, bench_preprocess, bench_detectors, bench_full_cycle);
criterion_main!(benches);
