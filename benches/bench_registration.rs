use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scanalign::{register, transform_points, PointSet, RegistrationConfig, RigidPose, SurfaceModel};

const Z_UP: [f32; 3] = [0.0, 0.0, 1.0];

/// Floor plus two walls sampled at `spacing`, with millimetre noise.
fn room(spacing: f32, seed: u64) -> PointSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut noise = move || rng.gen_range(-0.002f32..0.002);
    let steps = |len: f32| (len / spacing) as usize;
    let mut pts = Vec::new();
    for i in 0..steps(2.0) {
        let x = 0.6 + i as f32 * spacing;
        for j in 0..steps(1.5) {
            pts.push([x, -0.75 + j as f32 * spacing, -0.4 + noise()]);
        }
        for k in 1..steps(1.2) {
            pts.push([x, 0.75 + noise(), -0.4 + k as f32 * spacing]);
        }
    }
    for j in 0..steps(1.5) {
        for k in 1..steps(1.2) {
            pts.push([2.6 + noise(), -0.75 + j as f32 * spacing, -0.4 + k as f32 * spacing]);
        }
    }
    PointSet::from_points(&pts)
}

fn bench_register(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_room");
    group.sample_size(20);

    let truth = RigidPose::from_axis_angle(Z_UP, 0.07)
        .compose(&RigidPose::from_translation([0.05, -0.03, 0.01]));
    let config = RegistrationConfig::default()
        .with_up(Z_UP)
        .with_model_up(Z_UP)
        .with_levels(vec![0.04, 0.02, 0.01], vec![0.12, 0.06, 0.03]);

    for spacing in [0.02f32, 0.01] {
        let model_points = room(spacing, 1);
        let scan = transform_points(&room(spacing, 2), &truth);
        let model = SurfaceModel::new("room", model_points);
        group.bench_with_input(
            BenchmarkId::new("three_levels", scan.len()),
            &scan,
            |b, scan| b.iter(|| register(scan, &model, &config)),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_register);
criterion_main!(benches);
