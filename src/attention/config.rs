use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::kernel::lanes::ExecutionMode;
use crate::kernel::quantize::FixedPoint;
use crate::kernel::sdpa::SdpaConfig;
use crate::numeric::{check_product_headroom, Element};

/// How query heads map onto key/value heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeadPolicy {
    /// Every query head has its own K/V projection.
    #[default]
    IndependentKv,
    /// `num_heads / kv_heads` consecutive query heads share one K/V pair.
    SharedKv { kv_heads: usize },
}

impl HeadPolicy {
    pub fn kv_heads(&self, num_heads: usize) -> usize {
        match self {
            HeadPolicy::IndependentKv => num_heads,
            HeadPolicy::SharedKv { kv_heads } => *kv_heads,
        }
    }

    /// K/V head read by query head `head`.
    pub fn kv_head_for(&self, head: usize, num_heads: usize) -> usize {
        match self {
            HeadPolicy::IndependentKv => head,
            HeadPolicy::SharedKv { kv_heads } => head / (num_heads / kv_heads),
        }
    }

    /// `kv_heads` must be non-zero and divide `num_heads`.
    pub fn validate(&self, num_heads: usize) -> Result<()> {
        if let HeadPolicy::SharedKv { kv_heads } = self {
            if *kv_heads == 0 || *kv_heads > num_heads || num_heads % kv_heads != 0 {
                return Err(KernelError::InvalidHeadPolicy {
                    reason: format!(
                        "{} query heads cannot be grouped over {} kv heads",
                        num_heads, kv_heads
                    ),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for HeadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadPolicy::IndependentKv => write!(f, "independent-kv"),
            HeadPolicy::SharedKv { kv_heads } => write!(f, "shared-kv(kv_heads={})", kv_heads),
        }
    }
}

/// Construction-time parameters of a multi-head attention block.
///
/// For self-attention `context_len == seq_len` and `context_dim == model_dim`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionConfig {
    pub seq_len: usize,
    pub model_dim: usize,
    pub context_len: usize,
    pub context_dim: usize,
    pub head_dim: usize,
    pub num_heads: usize,
    #[serde(default)]
    pub head_policy: HeadPolicy,
    #[serde(default = "default_rows_per_batch")]
    pub rows_per_batch: usize,
    #[serde(default)]
    pub frac_bits: FixedPoint,
    /// Attention divisor, `sqrt(head_dim)` when absent.
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub execution: ExecutionMode,
}

fn default_rows_per_batch() -> usize {
    1
}

impl AttentionConfig {
    pub fn self_attention(seq_len: usize, model_dim: usize, num_heads: usize, head_dim: usize) -> Self {
        Self::cross_attention(seq_len, model_dim, seq_len, model_dim, num_heads, head_dim)
    }

    pub fn cross_attention(
        seq_len: usize,
        model_dim: usize,
        context_len: usize,
        context_dim: usize,
        num_heads: usize,
        head_dim: usize,
    ) -> Self {
        Self {
            seq_len,
            model_dim,
            context_len,
            context_dim,
            head_dim,
            num_heads,
            head_policy: HeadPolicy::IndependentKv,
            rows_per_batch: 1,
            frac_bits: FixedPoint::DEFAULT,
            scale: None,
            execution: ExecutionMode::Serial,
        }
    }

    pub fn with_head_policy(mut self, head_policy: HeadPolicy) -> Self {
        self.head_policy = head_policy;
        self
    }

    pub fn with_rows_per_batch(mut self, rows_per_batch: usize) -> Self {
        self.rows_per_batch = rows_per_batch;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_fixed_point(mut self, fixed_point: FixedPoint) -> Self {
        self.frac_bits = fixed_point;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    pub fn is_self_attention(&self) -> bool {
        self.context_len == self.seq_len && self.context_dim == self.model_dim
    }

    pub fn scale(&self) -> f64 {
        self.scale.unwrap_or_else(|| (self.head_dim as f64).sqrt())
    }

    pub fn kv_heads(&self) -> usize {
        self.head_policy.kv_heads(self.num_heads)
    }

    /// Kernel parameters shared by every head.
    pub fn sdpa_config(&self) -> SdpaConfig {
        SdpaConfig::cross(self.seq_len, self.context_len, self.head_dim)
            .with_rows_per_batch(self.rows_per_batch)
            .with_fixed_point(self.frac_bits)
            .with_scale(self.scale())
            .with_execution(self.execution)
    }

    pub(crate) fn validate<T: Element>(&self) -> Result<()> {
        for (name, value) in [
            ("seq_len", self.seq_len),
            ("model_dim", self.model_dim),
            ("context_len", self.context_len),
            ("context_dim", self.context_dim),
            ("head_dim", self.head_dim),
            ("num_heads", self.num_heads),
        ] {
            if value == 0 {
                return Err(KernelError::zero_dim(name));
            }
        }
        self.head_policy.validate(self.num_heads)?;
        check_product_headroom::<T>(self.model_dim)?;
        check_product_headroom::<T>(self.context_dim)?;
        check_product_headroom::<T>(self.num_heads * self.head_dim)
    }
}
