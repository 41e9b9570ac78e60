use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use grid_halo::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn periodic_square(n: i32) -> Cart {
    Cart::new(
        Range::new(&[0, 0], &[n, n]).unwrap(),
        [true, true, false],
        PeriodicStorage::Unique,
    )
    .unwrap()
}

/// Serial periodic exchange: only local copies, no messages.
fn bench_local_copies(c: &mut Criterion) {
    let mut group = c.benchmark_group("halo_local_copies");
    for &n in &[64, 256] {
        let cart = periodic_square(n);
        let p = Partition::discover(&NoComm, cart, *cart.range(), PartitionConfig::default())
            .unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        let mut field = DistributedField::new(Arc::new(p), 0.0f64);
        for v in field.values_mut().values_mut() {
            *v = rng.r#gen::<f64>();
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| field.exchange().unwrap().wait().unwrap())
        });
    }
    group.finish();
}

/// Four thread ranks exchanging a 2-D periodic field repeatedly.
fn bench_thread_ranks(c: &mut Criterion) {
    let mut group = c.benchmark_group("halo_thread_ranks");
    group.sample_size(10);
    for &n in &[64, 256] {
        let cart = periodic_square(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                ThreadComm::run(4, |comm| {
                    let local = cartesian_decomp(&cart, comm.rank(), [2, 2, 1]).unwrap();
                    let p = Partition::discover(&comm, cart, local, PartitionConfig::default())
                        .unwrap();
                    let mut field = DistributedField::new(Arc::new(p), comm.rank() as f32);
                    for _ in 0..20 {
                        field.exchange().unwrap().wait().unwrap();
                    }
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_local_copies, bench_thread_ranks);
criterion_main!(benches);
