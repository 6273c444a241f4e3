//! Cascade and engine benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use zm_dsp::biquad::Cascade;
use zm_dsp::engine::ZPlaneEngine;
use zm_dsp::morph::CoefficientUpdater;
use zm_dsp::shapes::ShapeBank;
use zm_dsp::PerformanceMode;

fn bench_cascade(c: &mut Criterion) {
    let mut updater = CoefficientUpdater::new(ShapeBank::new(), 48000.0);
    let coeffs = updater.update_immediate(0.5, 0.5);

    let mut cascade = Cascade::default();
    for (s, k) in cascade.sections.iter_mut().zip(coeffs.iter()) {
        s.set_coeffs(*k);
    }

    let buffer: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).sin()).collect();

    c.bench_function("cascade_clean_1024", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &x in black_box(&buffer) {
                acc += cascade.process(x);
            }
            black_box(acc)
        })
    });

    cascade.set_saturation(0.8);
    c.bench_function("cascade_saturated_1024", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &x in black_box(&buffer) {
                acc += cascade.process(x);
            }
            black_box(acc)
        })
    });
}

fn bench_coefficient_update(c: &mut Criterion) {
    for mode in [PerformanceMode::Authentic, PerformanceMode::Efficient] {
        let mut updater = CoefficientUpdater::new(ShapeBank::new(), 48000.0);
        updater.set_mode(mode);
        let name = format!("coeff_update_{mode:?}");
        let mut morph = 0.0;
        c.bench_function(&name, |b| {
            b.iter(|| {
                morph = (morph + 0.01) % 1.0;
                black_box(updater.update_block(black_box(morph), 0.5, 512))
            })
        });
    }
}

fn bench_engine_block(c: &mut Criterion) {
    let mut engine = ZPlaneEngine::default();
    engine.prepare(48000.0, 512).unwrap();
    engine.params().set_morph(0.5);
    engine.params().set_intensity(0.5);

    let mut left: Vec<f64> = (0..512).map(|i| (i as f64 * 0.01).sin()).collect();
    let mut right = left.clone();

    c.bench_function("engine_block_512", |b| {
        b.iter(|| {
            engine.process(black_box(&mut left), black_box(&mut right));
        })
    });
}

criterion_group!(benches, bench_cascade, bench_coefficient_update, bench_engine_block);
criterion_main!(benches);
