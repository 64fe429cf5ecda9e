use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use functor_pool::{from_map, FunctorPool, Sequencer};

fn busy_hash(mut x: u64) -> u64 {
    for _ in 0..256 {
        x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    }
    x
}

fn bench_imap_chunk_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("imap_chunk_size");
    let workers = (0..4).map(|_| from_map(busy_hash)).collect();
    let mut pool = FunctorPool::new(workers);
    pool.start().unwrap();
    pool.until_all_ready().unwrap();

    for chunk_size in [1usize, 16, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let sum = pool
                        .imap(0..10_000u64, chunk_size)
                        .unwrap()
                        .map(|r| r.unwrap())
                        .fold(0u64, u64::wrapping_add);
                    black_box(sum);
                });
            },
        );
    }
    group.finish();
    pool.shutdown().unwrap();
}

fn bench_sequencer_reverse_arrivals(c: &mut Criterion) {
    c.bench_function("sequencer_reverse_1024", |b| {
        b.iter(|| {
            let mut sequencer = Sequencer::new();
            let mut released = 0usize;
            for seq in (0..1024u64).rev() {
                released += sequencer.submit(seq, seq).unwrap().count();
            }
            black_box(released);
        });
    });
}

criterion_group!(
    imap_benches,
    bench_imap_chunk_sizes,
    bench_sequencer_reverse_arrivals
);
criterion_main!(imap_benches);
