//! Streaming, quantization-aware scaled dot-product attention.
//!
//! [`StreamingSdpa`] computes `softmax(Q · Kᵗ / scale) · V` P query rows at a
//! time with `O(P · kv_len)` transient storage, for float and integer operand
//! kinds. [`MultiHeadAttention`] projects inputs per head, runs the kernel on
//! every head and combines the results through the output projection.

pub mod attention;
pub mod error;
pub mod kernel;
pub mod matrix;
pub mod numeric;
#[doc(hidden)]
pub mod reference;

pub use attention::{
    AttentionConfig, AttentionWeights, FeedForward, FeedForwardShape, HeadPolicy,
    MultiHeadAttention, ProjectedKv,
};
pub use error::{KernelError, Result};
pub use kernel::{
    init_lanes, scaled_dot_product_attention, ExecutionMode, FixedPoint, LaneCount, LanePool,
    QuantizedProbability, SdpaConfig, StreamingSdpa,
};
pub use matrix::Matrix;
pub use numeric::{Element, NumericKind, I4};
