//! Criterion benchmarks for the MSTGCN forward pass

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mstgcn_forecast::prelude::*;
use ndarray::Array4;

fn bench_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("MSTGCN Forward");

    for nodes in [10, 50, 100].iter() {
        let model = Mstgcn::new(MstgcnConfig::default().seed(1)).unwrap();
        let x = Array4::from_elem((4, *nodes, 2, 12), 0.5);
        let connectivity: Connectivity = EdgeIndex::ring(*nodes).into();

        group.bench_with_input(BenchmarkId::new("nodes", nodes), &x, |b, x| {
            b.iter(|| model.forward(black_box(x), black_box(&connectivity)).unwrap());
        });
    }

    group.finish();
}

fn bench_lambda_max(c: &mut Criterion) {
    let mut group = c.benchmark_group("Laplacian lambda_max");

    for nodes in [10, 50, 100].iter() {
        let edges = EdgeIndex::ring(*nodes);
        let symmetric = Laplacian::from_edges(&edges, *nodes, LaplacianNormalization::Unnormalized).unwrap();

        let directed: Vec<(usize, usize)> = (0..*nodes).map(|i| (i, (i + 1) % nodes)).collect();
        let directed =
            Laplacian::from_edges(&EdgeIndex::new(directed), *nodes, LaplacianNormalization::Unnormalized)
                .unwrap();

        group.bench_with_input(BenchmarkId::new("symmetric", nodes), &symmetric, |b, lap| {
            b.iter(|| black_box(lap).lambda_max().unwrap());
        });
        group.bench_with_input(BenchmarkId::new("directed", nodes), &directed, |b, lap| {
            b.iter(|| black_box(lap).lambda_max().unwrap());
        });
    }

    group.finish();
}

fn bench_time_varying(c: &mut Criterion) {
    let model = Mstgcn::new(MstgcnConfig::default().seed(2)).unwrap();
    let x = Array4::from_elem((4, 50, 2, 12), 0.5);
    let connectivity = Connectivity::repeated(&EdgeIndex::ring(50), 12);

    c.bench_function("MSTGCN Forward time-varying 50 nodes", |b| {
        b.iter(|| model.forward(black_box(&x), black_box(&connectivity)).unwrap());
    });
}

criterion_group!(benches, bench_forward, bench_lambda_max, bench_time_varying);
criterion_main!(benches);
