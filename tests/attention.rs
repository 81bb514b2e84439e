mod common;

use oxide_sdpa::{
    reference, AttentionConfig, AttentionWeights, ExecutionMode, HeadPolicy, Matrix,
    MultiHeadAttention,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

#[test]
fn test_twelve_heads_match_float_reference() {
    let mut rng = StdRng::seed_from_u64(1024);
    let config = AttentionConfig::self_attention(1024, 768, 12, 64)
        .with_rows_per_batch(16)
        .with_execution(ExecutionMode::Parallel);
    let bound = 1.0 / 768f32.sqrt();
    let weights = AttentionWeights::<f32>::generate(&config, || rng.gen_range(-bound..bound));
    let x = common::random_float::<f32>(&mut rng, 1024, 768, 1.0);

    let out = MultiHeadAttention::<f32>::new(config.clone())
        .unwrap()
        .forward(&x, &weights)
        .unwrap();
    assert_eq!(out.shape(), (1024, 768));

    let expected = reference::multi_head(&config, &x, &x, &weights).unwrap();
    let err = reference::normwise_error(&out.to_f64(), &expected);
    assert!(err <= 1e-4, "normwise error {err}");
}

#[test]
fn test_head_order_permutations_agree() {
    let mut rng = StdRng::seed_from_u64(8);
    let config = AttentionConfig::self_attention(32, 48, 6, 8).with_rows_per_batch(8);
    let weights = AttentionWeights::<i8>::generate(&config, || rng.gen_range(-2..=2));
    let x = common::random_int::<i8>(&mut rng, 32, 48, -4, 4);
    let mha = MultiHeadAttention::<i8>::new(config).unwrap();
    let kv = mha.project_static_kv(&x, &weights).unwrap();
    let expected = mha.forward_with_kv(&x, &kv, &weights).unwrap();

    let mut order: Vec<usize> = (0..6).collect();
    for _ in 0..5 {
        order.shuffle(&mut rng);
        let out = mha.forward_scheduled(&x, &kv, &weights, &order).unwrap();
        assert_eq!(out, expected, "order {order:?}");
    }
}

#[test]
fn test_shared_kv_matches_duplicated_weights() {
    let mut rng = StdRng::seed_from_u64(12);
    let shared_config = AttentionConfig::self_attention(16, 32, 6, 8)
        .with_head_policy(HeadPolicy::SharedKv { kv_heads: 2 })
        .with_rows_per_batch(4);
    let shared = AttentionWeights::<f32>::generate(&shared_config, || rng.gen_range(-0.2..0.2));
    let duplicated = AttentionWeights::new(
        shared.heads.clone(),
        (0..6).map(|h| shared.kv[h / 3].clone()).collect(),
    );
    let independent_config = shared_config.clone().with_head_policy(HeadPolicy::IndependentKv);
    let x = common::random_float::<f32>(&mut rng, 16, 32, 1.0);

    let a = MultiHeadAttention::<f32>::new(shared_config)
        .unwrap()
        .forward(&x, &shared)
        .unwrap();
    let b = MultiHeadAttention::<f32>::new(independent_config)
        .unwrap()
        .forward(&x, &duplicated)
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_static_kv_matches_dynamic_projection() {
    let mut rng = StdRng::seed_from_u64(77);
    let config = AttentionConfig::cross_attention(20, 32, 77, 24, 4, 8)
        .with_rows_per_batch(5)
        .with_execution(ExecutionMode::Parallel);
    let weights = AttentionWeights::<f32>::generate(&config, || rng.gen_range(-0.25..0.25));
    let context = common::random_float::<f32>(&mut rng, 77, 24, 1.0);
    let mha = MultiHeadAttention::<f32>::new(config.clone()).unwrap();
    let cached = mha.project_static_kv(&context, &weights).unwrap();

    for _ in 0..4 {
        let x = common::random_float::<f32>(&mut rng, 20, 32, 1.0);
        let reused = mha.forward_with_kv(&x, &cached, &weights).unwrap();
        let projected = mha.project_static_kv(&context, &weights).unwrap();
        assert_eq!(reused, mha.forward_with_kv(&x, &projected, &weights).unwrap());

        let expected = reference::multi_head(&config, &x, &context, &weights).unwrap();
        assert!(reference::normwise_error(&reused.to_f64(), &expected) < 1e-4);
    }
}

#[test]
fn test_integer_output_projection_saturates() {
    let config = AttentionConfig::self_attention(4, 8, 2, 4).with_scale(1.0);
    let weights = AttentionWeights::<i8>::generate(&config, || 127);
    let x = Matrix::<i8>::from_fn(4, 8, |_, _| 127);
    let out = MultiHeadAttention::<i8>::new(config)
        .unwrap()
        .forward(&x, &weights)
        .unwrap();
    assert!(out.as_slice().iter().all(|&v| v == i8::MAX));
}
