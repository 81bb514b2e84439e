//! Multi-head attention orchestration
//!
//! Projects queries per head and keys/values per K/V head, runs the streaming
//! kernel once per head, and combines the head outputs through the output
//! projection. Heads are independent: each one reads only the shared,
//! read-only weights and K/V projections and writes only its own output, so
//! they run in any order or in parallel with identical results.
//!
//! Two paths are exposed:
//! - static: [`MultiHeadAttention::project_static_kv`] projects K/V from a
//!   fixed context once; the caller keeps the [`ProjectedKv`] and reuses it
//! - dynamic: [`MultiHeadAttention::forward_with_kv`] projects queries and runs
//!   attention for every step

use rayon::prelude::*;

use crate::attention::config::AttentionConfig;
use crate::attention::weights::AttentionWeights;
use crate::error::{KernelError, Result};
use crate::kernel::lanes::{ExecutionMode, LanePool};
use crate::kernel::matmul::{multiply_transposed, multiply_transposed_accumulate};
use crate::kernel::sdpa::StreamingSdpa;
use crate::matrix::Matrix;
use crate::numeric::Element;

/// Key/value projections of one K/V head.
#[derive(Debug, Clone, PartialEq)]
pub struct KvHead<T> {
    pub k: Matrix<T>,
    pub v: Matrix<T>,
}

/// K/V projections for every K/V head, computed once from a context.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedKv<T> {
    pub heads: Vec<KvHead<T>>,
}

#[derive(Debug, Clone)]
pub struct MultiHeadAttention<T> {
    config: AttentionConfig,
    kernel: StreamingSdpa<T>,
}

impl<T: Element> MultiHeadAttention<T> {
    pub fn new(config: AttentionConfig) -> Result<Self> {
        config.validate::<T>()?;
        let kernel = StreamingSdpa::new(config.sdpa_config())?;

        tracing::debug!(
            "Multi-head attention: kind={} heads={} kv_heads={} policy={} seq_len={} context_len={} model_dim={}",
            T::KIND,
            config.num_heads,
            config.kv_heads(),
            config.head_policy,
            config.seq_len,
            config.context_len,
            config.model_dim
        );

        Ok(Self { config, kernel })
    }

    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    pub fn kernel(&self) -> &StreamingSdpa<T> {
        &self.kernel
    }

    /// Static path: `K_g = C · W_k[g]ᵗ`, `V_g = C · W_v[g]ᵗ` for every K/V head.
    pub fn project_static_kv(
        &self,
        context: &Matrix<T>,
        weights: &AttentionWeights<T>,
    ) -> Result<ProjectedKv<T>> {
        context.expect_shape("context", self.config.context_len, self.config.context_dim)?;
        weights.validate(&self.config)?;

        let project = |g: usize| -> Result<KvHead<T>> {
            let kv = &weights.kv[g];
            Ok(KvHead {
                k: multiply_transposed(context, &kv.w_k)?,
                v: multiply_transposed(context, &kv.w_v)?,
            })
        };

        let heads = match self.config.execution {
            ExecutionMode::Serial => (0..weights.kv.len()).map(project).collect::<Result<Vec<_>>>()?,
            ExecutionMode::Parallel => LanePool::get().install(|| {
                (0..weights.kv.len())
                    .into_par_iter()
                    .map(project)
                    .collect::<Result<Vec<_>>>()
            })?,
        };

        Ok(ProjectedKv { heads })
    }

    /// Self-attention: K/V are projected from `x` itself.
    pub fn forward(&self, x: &Matrix<T>, weights: &AttentionWeights<T>) -> Result<Matrix<T>> {
        if !self.config.is_self_attention() {
            return Err(KernelError::InvalidDimension {
                name: "context",
                reason: "cross-attention needs projected K/V from its context".to_string(),
            });
        }
        let kv = self.project_static_kv(x, weights)?;
        self.forward_with_kv(x, &kv, weights)
    }

    /// Dynamic path: project queries from `x` and attend to precomputed K/V.
    pub fn forward_with_kv(
        &self,
        x: &Matrix<T>,
        kv: &ProjectedKv<T>,
        weights: &AttentionWeights<T>,
    ) -> Result<Matrix<T>> {
        let heads = self.head_outputs(x, kv, weights)?;
        self.combine(&heads, weights)
    }

    /// Run heads one at a time in `order`; the result does not depend on it.
    pub fn forward_scheduled(
        &self,
        x: &Matrix<T>,
        kv: &ProjectedKv<T>,
        weights: &AttentionWeights<T>,
        order: &[usize],
    ) -> Result<Matrix<T>> {
        self.check_inputs(x, kv, weights)?;
        let num_heads = self.config.num_heads;
        let mut seen = vec![false; num_heads];
        let is_permutation = order.len() == num_heads
            && order
                .iter()
                .all(|&h| h < num_heads && !std::mem::replace(&mut seen[h], true));
        if !is_permutation {
            return Err(KernelError::InvalidHeadPolicy {
                reason: format!("{:?} is not an ordering of {} heads", order, num_heads),
            });
        }

        let mut slots: Vec<Option<Matrix<T>>> = vec![None; num_heads];
        for &h in order {
            slots[h] = Some(self.run_head(x, kv, weights, h)?);
        }
        let heads: Vec<Matrix<T>> = slots.into_iter().flatten().collect();
        self.combine(&heads, weights)
    }

    /// Per-head attention outputs `[seq_len, head_dim]` before the output
    /// projection, in head-index order.
    pub fn head_outputs(
        &self,
        x: &Matrix<T>,
        kv: &ProjectedKv<T>,
        weights: &AttentionWeights<T>,
    ) -> Result<Vec<Matrix<T>>> {
        self.check_inputs(x, kv, weights)?;
        let num_heads = self.config.num_heads;
        match self.config.execution {
            ExecutionMode::Serial => (0..num_heads)
                .map(|h| self.run_head(x, kv, weights, h))
                .collect(),
            ExecutionMode::Parallel => LanePool::get().install(|| {
                (0..num_heads)
                    .into_par_iter()
                    .map(|h| self.run_head(x, kv, weights, h))
                    .collect()
            }),
        }
    }

    fn run_head(
        &self,
        x: &Matrix<T>,
        kv: &ProjectedKv<T>,
        weights: &AttentionWeights<T>,
        h: usize,
    ) -> Result<Matrix<T>> {
        let head = weights.head(h, &self.config)?;
        tracing::trace!("head {} reads kv head {}", head.index, head.kv_index);
        let q = multiply_transposed(x, head.w_q)?;
        let shared = &kv.heads[head.kv_index];
        self.kernel.forward(&q, &shared.k, &shared.v)
    }

    /// `out = Σ_h head_h · W_o[h]ᵗ`, summed in head-index order and narrowed once.
    fn combine(&self, heads: &[Matrix<T>], weights: &AttentionWeights<T>) -> Result<Matrix<T>> {
        let (rows, cols) = (self.config.seq_len, self.config.model_dim);
        let mut acc = vec![T::Acc::default(); rows * cols];
        for (head, w) in heads.iter().zip(&weights.heads) {
            multiply_transposed_accumulate(head, &w.w_o, &mut acc)?;
        }
        Matrix::from_vec(rows, cols, acc.into_iter().map(T::narrow).collect())
    }

    fn check_inputs(
        &self,
        x: &Matrix<T>,
        kv: &ProjectedKv<T>,
        weights: &AttentionWeights<T>,
    ) -> Result<()> {
        let cfg = &self.config;
        x.expect_shape("input", cfg.seq_len, cfg.model_dim)?;
        weights.validate(cfg)?;
        if kv.heads.len() != cfg.kv_heads() {
            return Err(KernelError::InvalidHeadPolicy {
                reason: format!(
                    "{} projected kv heads for policy {}",
                    kv.heads.len(),
                    cfg.head_policy
                ),
            });
        }
        for head in &kv.heads {
            head.k.expect_shape("projected key", cfg.context_len, cfg.head_dim)?;
            head.v.expect_shape("projected value", cfg.context_len, cfg.head_dim)?;
        }
        Ok(())
    }
}
