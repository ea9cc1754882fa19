use super::{get_buffer, random_items};
use criterion::{criterion_group, BatchSize, Criterion};

/// Number of items to append in each benchmark iteration.
const ITEMS_TO_WRITE: usize = 1_000;

fn bench_add(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let items = random_items(ITEMS_TO_WRITE);
    c.bench_function(module_path!(), |b| {
        b.iter_batched(
            || get_buffer(dir.path()),
            |buffer| {
                for item in &items {
                    buffer.add(item).unwrap();
                }
            },
            BatchSize::PerIteration,
        );
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_add
}
