//! oxide-sdpa error types

use crate::numeric::NumericKind;

/// oxide-sdpa result type
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors raised while constructing or validating a kernel invocation.
///
/// Every variant is produced before any arithmetic runs. Once a kernel has
/// been built and its operands validated, execution cannot fail.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Operand dimensions disagree with the declared shape
    #[error("shape mismatch for {operand}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        operand: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// A construction parameter is zero or otherwise unusable
    #[error("invalid dimension '{name}': {reason}")]
    InvalidDimension { name: &'static str, reason: String },

    /// The row count cannot be split into whole batches of P rows
    #[error("{rows} rows are not divisible by a batch of {batch} rows")]
    IndivisibleBatch { rows: usize, batch: usize },

    /// The accumulator chosen for a numeric kind is too narrow
    #[error(
        "{kind} accumulator overflow risk over {terms} terms: needs {required_bits} bits, has {available_bits}"
    )]
    AccumulatorOverflow {
        kind: NumericKind,
        terms: usize,
        required_bits: u32,
        available_bits: u32,
    },

    #[error("fixed-point exponent {frac_bits} is outside 1..=30")]
    InvalidFixedPoint { frac_bits: u32 },

    #[error("attention scale divisor must be finite and positive, got {scale}")]
    InvalidScale { scale: f64 },

    #[error("invalid head policy: {reason}")]
    InvalidHeadPolicy { reason: String },

    /// Error from candle tensor conversion
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl KernelError {
    pub(crate) fn shape(operand: &'static str, expected: (usize, usize), got: (usize, usize)) -> Self {
        KernelError::ShapeMismatch {
            operand,
            expected,
            got,
        }
    }

    pub(crate) fn zero_dim(name: &'static str) -> Self {
        KernelError::InvalidDimension {
            name,
            reason: "must be > 0".to_string(),
        }
    }
}
