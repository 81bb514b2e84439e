use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use oxide_sdpa::{SdpaConfig, StreamingSdpa};

mod common;

const HEAD_DIM: usize = 64;

fn kernel_int8(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel_int8");
    let mut rng = common::rng();

    for seq_len in [64, 256, 1024] {
        let q = common::int_operand::<i8>(&mut rng, seq_len, HEAD_DIM);
        let k = common::int_operand::<i8>(&mut rng, seq_len, HEAD_DIM);
        let v = common::int_operand::<i8>(&mut rng, seq_len, HEAD_DIM);
        let kernel = StreamingSdpa::<i8>::new(SdpaConfig::new(seq_len, HEAD_DIM).with_rows_per_batch(8))
            .expect("kernel");

        group.throughput(Throughput::Elements((seq_len * seq_len) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(seq_len), &seq_len, |b, _| {
            b.iter(|| black_box(kernel.forward(&q, &k, &v).expect("forward")));
        });
    }

    group.finish();
}

fn kernel_f32(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel_f32");
    let mut rng = common::rng();

    for seq_len in [64, 256, 1024] {
        let q = common::float_operand::<f32>(&mut rng, seq_len, HEAD_DIM, 1.0);
        let k = common::float_operand::<f32>(&mut rng, seq_len, HEAD_DIM, 1.0);
        let v = common::float_operand::<f32>(&mut rng, seq_len, HEAD_DIM, 1.0);
        let kernel = StreamingSdpa::<f32>::new(SdpaConfig::new(seq_len, HEAD_DIM).with_rows_per_batch(8))
            .expect("kernel");

        group.throughput(Throughput::Elements((seq_len * seq_len) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(seq_len), &seq_len, |b, _| {
            b.iter(|| black_box(kernel.forward(&q, &k, &v).expect("forward")));
        });
    }

    group.finish();
}

criterion_group! {
    name = kernel;
    config = Criterion::default().sample_size(10);
    targets = kernel_int8, kernel_f32
}
criterion_main!(kernel);
