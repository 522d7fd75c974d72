// Separation benchmark - measure the STFT kernel and both separators on a
// synthetic stereo mixture
//
// Run with: cargo bench --bench separation_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use std::f64::consts::PI;
use unmix::{AudioBuffer, Duet, DuetConfig, Repet, RepetConfig, WindowParams, WindowType};

const SAMPLE_RATE: u32 = 8000;

fn stereo_mixture(num_samples: usize) -> AudioBuffer {
    let fs = f64::from(SAMPLE_RATE);
    let mut data = Array2::<f64>::zeros((2, num_samples));
    for n in 0..num_samples {
        let t = n as f64 / fs;
        let a = (2.0 * PI * 440.0 * t).sin();
        let b = (2.0 * PI * 880.0 * t).sin();
        let delayed_a = (2.0 * PI * 440.0 * (t - 1.0 / fs)).sin();
        data[[0, n]] = a + b;
        data[[1, n]] = 0.8 * delayed_a + b;
    }
    AudioBuffer::from_array(data, SAMPLE_RATE)
}

fn bench_stft(c: &mut Criterion) {
    let mut group = c.benchmark_group("stft");

    for &window_length in &[512usize, 1024, 2048] {
        let params = WindowParams::new(
            window_length,
            window_length / 2,
            WindowType::Hamming,
            window_length,
        );
        let signal: Vec<f64> = (0..4 * SAMPLE_RATE as usize)
            .map(|n| (2.0 * PI * 440.0 * n as f64 / f64::from(SAMPLE_RATE)).sin())
            .collect();

        group.bench_with_input(
            BenchmarkId::new("forward", window_length),
            &signal,
            |b, signal| {
                b.iter(|| {
                    let result = unmix::core::stft::stft(black_box(signal), &params, SAMPLE_RATE);
                    black_box(result)
                });
            },
        );
    }

    group.finish();
}

fn bench_separators(c: &mut Criterion) {
    let mut group = c.benchmark_group("separators");
    group.sample_size(10);

    let mixture = stereo_mixture(2 * SAMPLE_RATE as usize);
    let window = WindowParams::new(512, 256, WindowType::Hamming, 512);

    group.bench_function("duet_two_sources", |b| {
        b.iter(|| {
            let duet = Duet::new(black_box(&mixture), window, DuetConfig::new(2))
                .expect("duet construction");
            black_box(duet.run())
        });
    });

    group.bench_function("repet_with_period", |b| {
        b.iter(|| {
            let repet = Repet::new(black_box(&mixture), window, RepetConfig::with_period(0.5))
                .expect("repet construction");
            black_box(repet.run())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_stft, bench_separators);
criterion_main!(benches);
