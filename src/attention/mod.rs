pub mod config;
pub mod feed_forward;
pub mod multi_head;
pub mod weights;

pub use config::{AttentionConfig, HeadPolicy};
pub use feed_forward::{FeedForward, FeedForwardParams, FeedForwardShape};
pub use multi_head::{KvHead, MultiHeadAttention, ProjectedKv};
pub use weights::{AttentionWeights, HeadDescriptor, HeadWeights, KvWeights};
