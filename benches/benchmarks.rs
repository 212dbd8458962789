/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mcafit_rs::background::{estimate_background, BackgroundParameters};
use mcafit_rs::fitting::{fit_peaks, CalibrationMode, FitState, PeakDescriptor};
use mcafit_rs::spectrum::Spectrum;

const SLOPE: f64 = 0.01;

fn gaussian(chan: f64, center: f64, fwhm: f64, amplitude: f64) -> f64 {
    let sigma = fwhm / 2.35482;
    amplitude * (-(chan - center).powi(2) / (2.0 * sigma * sigma)).exp()
}

fn synthetic_spectrum(n: usize) -> Spectrum {
    let values: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64;
            200.0 * (-x / 800.0).exp()
                + gaussian(x, 640.0, 16.0, 3000.0)
                + gaussian(x, 706.0, 17.0, 450.0)
                + gaussian(x, 805.0, 18.0, 1500.0)
        })
        .collect();
    Spectrum::from_f64(&values)
}

fn background_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Background");
    let spectrum = synthetic_spectrum(2048);

    for compress in [1, 4, 8] {
        let params = BackgroundParameters {
            bottom_width: 1.0,
            compress,
            ..BackgroundParameters::default()
        };
        group.bench_function(format!("compress_{}", compress), |b| {
            b.iter(|| estimate_background(black_box(&spectrum), SLOPE, black_box(&params)))
        });
    }

    let params = BackgroundParameters {
        top_width: 0.5,
        bottom_width: 1.0,
        tangent: true,
        ..BackgroundParameters::default()
    };
    group.bench_function("top_and_tangent", |b| {
        b.iter(|| estimate_background(black_box(&spectrum), SLOPE, black_box(&params)))
    });

    group.finish();
}

fn fit_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Peak fit");
    let spectrum = synthetic_spectrum(2048);
    let peaks = vec![
        PeakDescriptor::new("Fe Ka", 6.40),
        PeakDescriptor::new("Fe Kb", 7.06),
        PeakDescriptor::new("Cu Ka", 8.05),
    ];
    let state = FitState {
        energy_slope: SLOPE,
        energy_flag: CalibrationMode::Optimize,
        fwhm_flag: CalibrationMode::Optimize,
        ..FitState::default()
    };

    group.bench_function("three_peaks", |b| {
        b.iter(|| fit_peaks(state.clone(), peaks.clone(), black_box(&spectrum)))
    });

    group.finish();
}

criterion_group!(benches, background_benchmark, fit_benchmark);
criterion_main!(benches);
