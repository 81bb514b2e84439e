//! Fixed-point probabilities for integer value accumulation
//!
//! A probability `p` in `[0, 1]` is stored as `trunc(p * 2^k)`. Value rows are
//! multiplied by that integer and summed in the accumulator, and the sum is
//! shifted right by `k` exactly once before narrowing.
//!
//! Rounding rules:
//! - `quantize` truncates toward zero, so a row of weights never sums past `2^k`.
//! - `rescale` is an arithmetic shift and rounds toward negative infinity.

use std::ops::Shr;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

pub const DEFAULT_FRAC_BITS: u32 = 15;

const MAX_FRAC_BITS: u32 = 30;

/// Fixed-point exponent `k` shared by quantization and rescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct FixedPoint {
    frac_bits: u32,
}

impl FixedPoint {
    pub const DEFAULT: FixedPoint = FixedPoint {
        frac_bits: DEFAULT_FRAC_BITS,
    };

    pub fn new(frac_bits: u32) -> Result<Self> {
        if frac_bits == 0 || frac_bits > MAX_FRAC_BITS {
            return Err(KernelError::InvalidFixedPoint { frac_bits });
        }
        Ok(Self { frac_bits })
    }

    pub fn frac_bits(&self) -> u32 {
        self.frac_bits
    }

    /// `2^k`, the integer representing probability 1.0.
    pub fn one(&self) -> i32 {
        1 << self.frac_bits
    }

    /// Shift a completed weighted sum back to value units.
    pub fn rescale<A: Shr<u32, Output = A>>(&self, acc: A) -> A {
        acc >> self.frac_bits
    }
}

impl Default for FixedPoint {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for FixedPoint {
    type Error = KernelError;

    fn try_from(frac_bits: u32) -> Result<Self> {
        FixedPoint::new(frac_bits)
    }
}

impl From<FixedPoint> for u32 {
    fn from(fixed: FixedPoint) -> u32 {
        fixed.frac_bits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QuantizedProbability {
    raw: i32,
    fixed: FixedPoint,
}

impl QuantizedProbability {
    /// Quantize `p`, clamping it into `[0, 1]` first. NaN maps to zero.
    pub fn quantize(p: f64, fixed: FixedPoint) -> Self {
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        let raw = (p * fixed.one() as f64).trunc() as i32;
        Self { raw, fixed }
    }

    pub fn raw(&self) -> i32 {
        self.raw
    }

    pub fn dequantize(&self) -> f64 {
        self.raw as f64 / self.fixed.one() as f64
    }
}
