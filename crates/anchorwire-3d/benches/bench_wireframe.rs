use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use anchorwire_3d::{build_wireframe, VoxelGrid};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_cloud(n: usize, seed: u64) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            [
                rng.random_range(-50.0..50.0),
                rng.random_range(-50.0..50.0),
                rng.random_range(0.0..30.0),
            ]
        })
        .collect()
}

fn bench_voxel_downsample(c: &mut Criterion) {
    let mut group = c.benchmark_group("voxel_downsample");
    let grid = VoxelGrid::new(2.0).expect("valid voxel size");
    for &n in &[1_000usize, 10_000, 100_000] {
        let cloud = random_cloud(n, 42);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| std::hint::black_box(grid.downsample(&cloud).expect("finite cloud")));
        });
    }
    group.finish();
}

fn bench_build_wireframe(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_wireframe");
    for &n in &[100usize, 500, 2_000] {
        let cloud = random_cloud(n, 7);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| std::hint::black_box(build_wireframe(&cloud, 4, 8.0)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_voxel_downsample, bench_build_wireframe);
criterion_main!(benches);
