use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use oxide_sdpa::{ExecutionMode, SdpaConfig, StreamingSdpa};

mod common;

const SEQ_LEN: usize = 512;
const HEAD_DIM: usize = 64;

fn rows_per_batch_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("rows_per_batch");
    let mut rng = common::rng();
    let q = common::int_operand::<i8>(&mut rng, SEQ_LEN, HEAD_DIM);
    let k = common::int_operand::<i8>(&mut rng, SEQ_LEN, HEAD_DIM);
    let v = common::int_operand::<i8>(&mut rng, SEQ_LEN, HEAD_DIM);

    for p in [1, 2, 4, 8, 16, 32, 64] {
        let kernel = StreamingSdpa::<i8>::new(SdpaConfig::new(SEQ_LEN, HEAD_DIM).with_rows_per_batch(p))
            .expect("kernel");
        group.bench_with_input(BenchmarkId::from_parameter(p), &p, |b, _| {
            b.iter(|| black_box(kernel.forward(&q, &k, &v).expect("forward")));
        });
    }

    group.finish();
}

fn serial_vs_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("execution");
    let mut rng = common::rng();
    let q = common::int_operand::<i8>(&mut rng, SEQ_LEN, HEAD_DIM);
    let k = common::int_operand::<i8>(&mut rng, SEQ_LEN, HEAD_DIM);
    let v = common::int_operand::<i8>(&mut rng, SEQ_LEN, HEAD_DIM);

    for (name, mode) in [("serial", ExecutionMode::Serial), ("parallel", ExecutionMode::Parallel)] {
        let config = SdpaConfig::new(SEQ_LEN, HEAD_DIM)
            .with_rows_per_batch(16)
            .with_execution(mode);
        let kernel = StreamingSdpa::<i8>::new(config).expect("kernel");
        group.bench_function(name, |b| {
            b.iter(|| black_box(kernel.forward(&q, &k, &v).expect("forward")));
        });
    }

    group.finish();
}

criterion_group! {
    name = batch;
    config = Criterion::default().sample_size(10);
    targets = rows_per_batch_sweep, serial_vs_parallel
}
criterion_main!(batch);
