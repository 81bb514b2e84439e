//! Seeded operand generators shared by the integration tests.

#![allow(dead_code)]

use oxide_sdpa::{Element, Matrix};
use rand::rngs::StdRng;
use rand::Rng;

pub fn random_int<T: Element>(rng: &mut StdRng, rows: usize, cols: usize, lo: i64, hi: i64) -> Matrix<T> {
    Matrix::from_fn(rows, cols, |_, _| T::from_f64(rng.gen_range(lo..hi) as f64))
}

pub fn random_float<T: Element>(rng: &mut StdRng, rows: usize, cols: usize, bound: f64) -> Matrix<T> {
    Matrix::from_fn(rows, cols, |_, _| T::from_f64(rng.gen_range(-bound..bound)))
}
