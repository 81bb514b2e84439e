pub mod lanes;
pub mod matmul;
pub mod quantize;
pub mod row_batch;
pub mod sdpa;
pub mod softmax;

pub use lanes::{init_lanes, ExecutionMode, LaneCount, LanePool, LaneTopology};
pub use matmul::{dot, multiply, multiply_transposed, multiply_transposed_accumulate};
pub use quantize::{FixedPoint, QuantizedProbability, DEFAULT_FRAC_BITS};
pub use row_batch::RowBatch;
pub use sdpa::{scaled_dot_product_attention, SdpaConfig, StreamingSdpa};
pub use softmax::{softmax, softmax_of, softmax_row};
