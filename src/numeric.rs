//! Numeric kinds supported by the kernels
//!
//! Each operand kind carries its own accumulator type. Integer kinds run the
//! value-weighted sum on fixed-point probabilities and saturate when narrowed;
//! float kinds accumulate in `f64` and keep probabilities in the float domain.

use std::fmt;
use std::ops::{Add, AddAssign, Mul};

use half::bf16;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::kernel::quantize::{FixedPoint, QuantizedProbability};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericKind {
    F64,
    F32,
    Bf16,
    I32,
    I16,
    I8,
    I4,
}

impl NumericKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "f64" | "float64" => Some(NumericKind::F64),
            "f32" | "float32" => Some(NumericKind::F32),
            "bf16" | "bfloat16" => Some(NumericKind::Bf16),
            "i32" | "int32" => Some(NumericKind::I32),
            "i16" | "int16" => Some(NumericKind::I16),
            "i8" | "int8" => Some(NumericKind::I8),
            "i4" | "int4" => Some(NumericKind::I4),
            _ => None,
        }
    }

    /// Storage width of one operand in bits.
    pub fn bits(&self) -> u32 {
        match self {
            NumericKind::F64 => 64,
            NumericKind::F32 | NumericKind::I32 => 32,
            NumericKind::Bf16 | NumericKind::I16 => 16,
            NumericKind::I8 => 8,
            NumericKind::I4 => 4,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            NumericKind::I32 | NumericKind::I16 | NumericKind::I8 | NumericKind::I4
        )
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NumericKind::F64 => "f64",
            NumericKind::F32 => "f32",
            NumericKind::Bf16 => "bf16",
            NumericKind::I32 => "i32",
            NumericKind::I16 => "i16",
            NumericKind::I8 => "i8",
            NumericKind::I4 => "i4",
        };
        f.write_str(name)
    }
}

/// Wide register used for dot products and value-weighted sums.
///
/// `Default::default()` is the additive zero every accumulation starts from.
pub trait Accumulator:
    Copy
    + Send
    + Sync
    + fmt::Debug
    + Default
    + PartialEq
    + Add<Output = Self>
    + AddAssign
    + Mul<Output = Self>
    + 'static
{
    /// Register width in bits, `None` for floating accumulators.
    const BITS: Option<u32>;

    fn to_f64(self) -> f64;

    /// Weight applied to one value row for probability `p`.
    fn probability_weight(p: f64, fixed: FixedPoint) -> Self;

    /// Undo the weight scaling once the value-weighted sum is complete.
    fn rescale(self, fixed: FixedPoint) -> Self;
}

impl Accumulator for f64 {
    const BITS: Option<u32> = None;

    fn to_f64(self) -> f64 {
        self
    }

    fn probability_weight(p: f64, _fixed: FixedPoint) -> Self {
        p
    }

    fn rescale(self, _fixed: FixedPoint) -> Self {
        self
    }
}

macro_rules! int_accumulator {
    ($($t:ty),*) => {
        $(
            impl Accumulator for $t {
                const BITS: Option<u32> = Some(<$t>::BITS);

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn probability_weight(p: f64, fixed: FixedPoint) -> Self {
                    QuantizedProbability::quantize(p, fixed).raw() as $t
                }

                fn rescale(self, fixed: FixedPoint) -> Self {
                    fixed.rescale(self)
                }
            }
        )*
    };
}

int_accumulator!(i32, i64, i128);

/// Operand element of a matrix.
pub trait Element: Copy + Send + Sync + fmt::Debug + PartialEq + 'static {
    type Acc: Accumulator;

    const KIND: NumericKind;

    fn zero() -> Self;

    fn widen(self) -> Self::Acc;

    /// Narrow an accumulator back to the operand kind.
    fn narrow(acc: Self::Acc) -> Self;

    fn to_f64(self) -> f64;

    fn from_f64(v: f64) -> Self;
}

/// Element kinds whose softmax can be computed in place.
pub trait FloatElement: Element<Acc = f64> {}

impl Element for f64 {
    type Acc = f64;
    const KIND: NumericKind = NumericKind::F64;

    fn zero() -> Self {
        0.0
    }

    fn widen(self) -> f64 {
        self
    }

    fn narrow(acc: f64) -> Self {
        acc
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(v: f64) -> Self {
        v
    }
}

impl Element for f32 {
    type Acc = f64;
    const KIND: NumericKind = NumericKind::F32;

    fn zero() -> Self {
        0.0
    }

    fn widen(self) -> f64 {
        self as f64
    }

    fn narrow(acc: f64) -> Self {
        acc as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl Element for bf16 {
    type Acc = f64;
    const KIND: NumericKind = NumericKind::Bf16;

    fn zero() -> Self {
        bf16::ZERO
    }

    fn widen(self) -> f64 {
        self.to_f64()
    }

    fn narrow(acc: f64) -> Self {
        bf16::from_f64(acc)
    }

    fn to_f64(self) -> f64 {
        bf16::to_f64(self)
    }

    fn from_f64(v: f64) -> Self {
        bf16::from_f64(v)
    }
}

impl FloatElement for f64 {}
impl FloatElement for f32 {}
impl FloatElement for bf16 {}

macro_rules! int_element {
    ($t:ty, $acc:ty, $kind:expr) => {
        impl Element for $t {
            type Acc = $acc;
            const KIND: NumericKind = $kind;

            fn zero() -> Self {
                0
            }

            fn widen(self) -> $acc {
                self as $acc
            }

            fn narrow(acc: $acc) -> Self {
                acc.clamp(<$t>::MIN as $acc, <$t>::MAX as $acc) as $t
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(v: f64) -> Self {
                // float-to-int `as` saturates and maps NaN to zero
                v.round() as $t
            }
        }
    };
}

int_element!(i32, i128, NumericKind::I32);
int_element!(i16, i64, NumericKind::I16);
int_element!(i8, i32, NumericKind::I8);

/// Signed 4-bit integer held in an `i8`, always within `[-8, 7]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct I4(i8);

impl I4 {
    pub const MIN: i8 = -8;
    pub const MAX: i8 = 7;

    /// Saturates values outside the 4-bit range.
    pub fn new(v: i8) -> Self {
        Self(v.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> i8 {
        self.0
    }
}

impl Element for I4 {
    type Acc = i32;
    const KIND: NumericKind = NumericKind::I4;

    fn zero() -> Self {
        I4(0)
    }

    fn widen(self) -> i32 {
        self.0 as i32
    }

    fn narrow(acc: i32) -> Self {
        I4(acc.clamp(Self::MIN as i32, Self::MAX as i32) as i8)
    }

    fn to_f64(self) -> f64 {
        self.0 as f64
    }

    fn from_f64(v: f64) -> Self {
        I4::new(v.round().clamp(Self::MIN as f64, Self::MAX as f64) as i8)
    }
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Ensure a dot product of `terms` products of `T` fits its accumulator.
///
/// Each product is bounded by `2^(2(b-1))` for a `b`-bit signed operand, so
/// the sum needs `2(b-1) + ceil(log2 terms)` magnitude bits plus sign and one
/// guard bit.
pub fn check_product_headroom<T: Element>(terms: usize) -> Result<()> {
    let Some(available_bits) = <T::Acc as Accumulator>::BITS else {
        return Ok(());
    };
    let operand_bits = T::KIND.bits();
    let required_bits = 2 * (operand_bits - 1) + ceil_log2(terms) + 2;
    if required_bits > available_bits {
        return Err(KernelError::AccumulatorOverflow {
            kind: T::KIND,
            terms,
            required_bits,
            available_bits,
        });
    }
    Ok(())
}

/// Ensure the fixed-point value-weighted sum fits the accumulator of `T`.
///
/// Truncated weights of one row sum to at most `2^k`, so the sum is bounded
/// by `2^(k + b - 1)` regardless of how many rows are weighted.
pub fn check_weighted_headroom<T: Element>(fixed: FixedPoint, terms: usize) -> Result<()> {
    let Some(available_bits) = <T::Acc as Accumulator>::BITS else {
        return Ok(());
    };
    let required_bits = fixed.frac_bits() + (T::KIND.bits() - 1) + 2;
    if required_bits > available_bits {
        return Err(KernelError::AccumulatorOverflow {
            kind: T::KIND,
            terms,
            required_bits,
            available_bits,
        });
    }
    Ok(())
}
