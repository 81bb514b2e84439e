mod common;

use oxide_sdpa::{FixedPoint, QuantizedProbability, SdpaConfig, StreamingSdpa};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Row batching never changes integer results
    #[test]
    fn batched_matches_unbatched(
        p in prop::sample::select(vec![1usize, 2, 3, 4, 8]),
        batches in 1usize..6,
        kv_len in 1usize..40,
        head_dim in 1usize..12,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let query_len = p * batches;
        let q = common::random_int::<i8>(&mut rng, query_len, head_dim, -8, 8);
        let k = common::random_int::<i8>(&mut rng, kv_len, head_dim, -8, 8);
        let v = common::random_int::<i8>(&mut rng, kv_len, head_dim, -128, 128);

        let base = SdpaConfig::cross(query_len, kv_len, head_dim);
        let unbatched = StreamingSdpa::<i8>::new(base).unwrap().forward(&q, &k, &v).unwrap();
        let batched = StreamingSdpa::<i8>::new(base.with_rows_per_batch(p))
            .unwrap()
            .forward(&q, &k, &v)
            .unwrap();
        prop_assert_eq!(batched, unbatched);
    }

    /// Probability rows sum to one and their fixed-point weights never exceed 2^k
    #[test]
    fn probability_rows_are_normalised(
        query_len in 1usize..16,
        kv_len in 1usize..64,
        head_dim in 1usize..16,
        scale in 0.05f64..16.0,
        frac_bits in 1u32..=30,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let q = common::random_float::<f32>(&mut rng, query_len, head_dim, 3.0);
        let k = common::random_float::<f32>(&mut rng, kv_len, head_dim, 3.0);
        let kernel = StreamingSdpa::<f32>::new(SdpaConfig::cross(query_len, kv_len, head_dim).with_scale(scale))
            .unwrap();
        let fixed = FixedPoint::new(frac_bits).unwrap();

        for row in 0..query_len {
            let probs = kernel.attention_row(&q, &k, row).unwrap();
            let sum: f64 = probs.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-5, "row {} sums to {}", row, sum);
            prop_assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));

            let raw: i64 = probs
                .iter()
                .map(|&p| QuantizedProbability::quantize(p, fixed).raw() as i64)
                .sum();
            prop_assert!(raw <= fixed.one() as i64);
        }
    }
}
