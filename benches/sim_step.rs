//! Benchmarks for the coupled simulation step.
//!
//! Run:
//! - cargo bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use glam::Vec3;

use sonobox::core::math::Bounds;
use sonobox::sim::governor::GovernorConfig;
use sonobox::sim::params::ForceParams;
use sonobox::sim::step::{NoSources, Simulation};

const POP_SIZES: [usize; 4] = [8, 24, 64, 128];

fn build_sim(n: usize) -> Simulation {
    let mut sim = Simulation::new(Bounds::default(), GovernorConfig::default());
    for i in 0..n {
        let x = (i % 8) as f32 - 3.5;
        let y = ((i / 8) % 6) as f32 - 2.5;
        let z = (i / 48) as f32 - 1.5;
        sim.spawn_at(Vec3::new(x, y, z), &NoSources);
    }
    sim
}

fn bench_update_quiet(c: &mut Criterion) {
    let mut group = c.benchmark_group("sim_update_quiet");
    group.sample_size(50);
    let p = ForceParams::default();
    for &n in &POP_SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut sim = build_sim(n);
            b.iter(|| {
                sim.update(black_box(1.0 / 60.0), &p, &NoSources);
            });
        });
    }
    group.finish();
}

fn bench_update_all_fields(c: &mut Criterion) {
    let mut group = c.benchmark_group("sim_update_all_fields");
    group.sample_size(50);
    // Every pairwise pass active: flocking, magneto, singularity.
    let p = ForceParams {
        wave: 0.8,
        magneto: 0.9,
        void: 0.4,
        wind: 0.5,
        merge: 0.0,
        ..ForceParams::default()
    };
    for &n in &POP_SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut sim = build_sim(n);
            b.iter(|| {
                sim.update(black_box(1.0 / 60.0), &p, &NoSources);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_update_quiet, bench_update_all_fields);
criterion_main!(benches);
