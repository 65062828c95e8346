use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use scanalign::filters::voxel_downsample;
use scanalign::PointSet;

fn diagonal_set(n: usize) -> PointSet {
    let x = (0..n).map(|i| i as f32 * 0.001).collect();
    let y = (0..n).map(|i| i as f32 * 0.002).collect();
    let z = (0..n).map(|i| i as f32 * 0.003).collect();
    PointSet::from_xyz(x, y, z)
}

fn bench_voxel(c: &mut Criterion) {
    let mut group = c.benchmark_group("voxel_downsample");
    for size in [10_000, 100_000, 1_000_000] {
        let set = diagonal_set(size);
        group.bench_with_input(BenchmarkId::new("centroid", size), &set, |b, set| {
            b.iter(|| voxel_downsample(set, 0.05))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_voxel);
criterion_main!(benches);
