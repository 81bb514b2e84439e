#![allow(dead_code)]

use oxide_sdpa::{Element, Matrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SEED: u64 = 0x0a7e;

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

pub fn int_operand<T: Element>(rng: &mut StdRng, rows: usize, cols: usize) -> Matrix<T> {
    Matrix::from_fn(rows, cols, |_, _| T::from_f64(rng.gen_range(-8i32..8) as f64))
}

pub fn float_operand<T: Element>(rng: &mut StdRng, rows: usize, cols: usize, bound: f64) -> Matrix<T> {
    Matrix::from_fn(rows, cols, |_, _| T::from_f64(rng.gen_range(-bound..bound)))
}
