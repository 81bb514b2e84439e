use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;

use oxide_sdpa::{AttentionConfig, AttentionWeights, MultiHeadAttention};

mod common;

fn static_vs_dynamic_kv(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_kv");
    let mut rng = common::rng();

    let config = AttentionConfig::cross_attention(64, 320, 77, 768, 8, 40).with_rows_per_batch(8);
    let weights = AttentionWeights::<f32>::generate(&config, || rng.gen_range(-0.05..0.05));
    let context = common::float_operand::<f32>(&mut rng, 77, 768, 1.0);
    let x = common::float_operand::<f32>(&mut rng, 64, 320, 1.0);
    let mha = MultiHeadAttention::<f32>::new(config).expect("attention");
    let kv = mha.project_static_kv(&context, &weights).expect("projection");

    group.bench_function("static", |b| {
        b.iter(|| black_box(mha.forward_with_kv(&x, &kv, &weights).expect("forward")));
    });

    group.bench_function("dynamic", |b| {
        b.iter(|| {
            let kv = mha.project_static_kv(&context, &weights).expect("projection");
            black_box(mha.forward_with_kv(&x, &kv, &weights).expect("forward"))
        });
    });

    group.finish();
}

criterion_group! {
    name = cross;
    config = Criterion::default().sample_size(10);
    targets = static_vs_dynamic_kv
}
criterion_main!(cross);
