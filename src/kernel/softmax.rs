//! Row-stable softmax
//!
//! Rows are normalised independently: subtract the row maximum, exponentiate,
//! sum and divide. The stages are exposed separately so the streaming kernel
//! can track the maximum while scores are produced.

use crate::matrix::Matrix;
use crate::numeric::FloatElement;

/// Exponentiate `row` relative to `max` in place and return the sum.
///
/// After max-subtraction every exponent is `<= 0` and the maximal entry
/// contributes exactly 1, so the sum is finite and at least 1 for any row
/// with a finite maximum.
pub fn exponentiate(row: &mut [f64], max: f64) -> f64 {
    if max.is_infinite() {
        return exponentiate_unbounded(row, max);
    }
    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    sum
}

// All mass goes to the +inf entries, or is spread uniformly when every
// entry is -inf.
fn exponentiate_unbounded(row: &mut [f64], max: f64) -> f64 {
    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = if max == f64::NEG_INFINITY || *x == max { 1.0 } else { 0.0 };
        sum += *x;
    }
    sum
}

pub fn normalize(row: &mut [f64], sum: f64) {
    let inv = sum.recip();
    for x in row.iter_mut() {
        *x *= inv;
    }
}

pub fn row_max(row: &[f64]) -> f64 {
    row.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Softmax one row in place.
pub fn softmax_row(row: &mut [f64]) {
    if row.is_empty() {
        return;
    }
    let max = row_max(row);
    let sum = exponentiate(row, max);
    normalize(row, sum);
}

/// Softmax every row of `m` in place.
pub fn softmax<T: FloatElement>(m: &mut Matrix<T>) {
    let mut scratch = vec![0.0; m.cols()];
    for i in 0..m.rows() {
        let row = m.row_mut(i);
        for (s, &x) in scratch.iter_mut().zip(row.iter()) {
            *s = x.to_f64();
        }
        softmax_row(&mut scratch);
        for (x, &s) in row.iter_mut().zip(&scratch) {
            *x = T::from_f64(s);
        }
    }
}

/// Value-returning softmax for dataflow composition.
pub fn softmax_of<T: FloatElement>(m: &Matrix<T>) -> Matrix<T> {
    let mut out = m.clone();
    softmax(&mut out);
    out
}
