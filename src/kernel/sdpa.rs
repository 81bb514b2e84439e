//! Streaming quantized scaled dot-product attention
//!
//! Computes `softmax(Q · Kᵗ / scale) · V` one batch of P query rows at a time.
//! Only the P score rows, their fixed-point weights and P·head_dim
//! accumulators are live at any point, so transient storage is `O(P · kv_len)`.
//!
//! Per batch:
//! 1. integer (or float) dot products against every key row, divided by
//!    `scale`, with the running row maximum tracked as scores are produced
//! 2. exponentiate against the maximum and sum (row barrier)
//! 3. normalise and convert to accumulator weights (`trunc(p · 2^k)` for
//!    integer kinds)
//! 4. value-weighted sum, a single `>> k` rescale, and narrowing
//!
//! A query length that is not a multiple of P is rejected at construction.

use std::marker::PhantomData;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::kernel::lanes::{ExecutionMode, LanePool};
use crate::kernel::quantize::FixedPoint;
use crate::kernel::row_batch::RowBatch;
use crate::matrix::Matrix;
use crate::numeric::{check_product_headroom, check_weighted_headroom, Element};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SdpaConfig {
    pub query_len: usize,
    pub kv_len: usize,
    pub head_dim: usize,
    #[serde(default = "default_rows_per_batch")]
    pub rows_per_batch: usize,
    #[serde(default, rename = "frac_bits")]
    pub fixed_point: FixedPoint,
    pub scale: f64,
    #[serde(default)]
    pub execution: ExecutionMode,
}

fn default_rows_per_batch() -> usize {
    1
}

impl SdpaConfig {
    /// Unbatched self-attention over `seq_len` rows with a `sqrt(head_dim)` divisor.
    pub fn new(seq_len: usize, head_dim: usize) -> Self {
        Self::cross(seq_len, seq_len, head_dim)
    }

    pub fn cross(query_len: usize, kv_len: usize, head_dim: usize) -> Self {
        Self {
            query_len,
            kv_len,
            head_dim,
            rows_per_batch: 1,
            fixed_point: FixedPoint::DEFAULT,
            scale: (head_dim as f64).sqrt(),
            execution: ExecutionMode::Serial,
        }
    }

    pub fn with_rows_per_batch(mut self, rows_per_batch: usize) -> Self {
        self.rows_per_batch = rows_per_batch;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_fixed_point(mut self, fixed_point: FixedPoint) -> Self {
        self.fixed_point = fixed_point;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    fn validate<T: Element>(&self) -> Result<()> {
        if self.query_len == 0 {
            return Err(KernelError::zero_dim("query_len"));
        }
        if self.kv_len == 0 {
            return Err(KernelError::zero_dim("kv_len"));
        }
        if self.head_dim == 0 {
            return Err(KernelError::zero_dim("head_dim"));
        }
        if self.rows_per_batch == 0 {
            return Err(KernelError::zero_dim("rows_per_batch"));
        }
        if self.query_len % self.rows_per_batch != 0 {
            return Err(KernelError::IndivisibleBatch {
                rows: self.query_len,
                batch: self.rows_per_batch,
            });
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(KernelError::InvalidScale { scale: self.scale });
        }
        check_product_headroom::<T>(self.head_dim)?;
        check_weighted_headroom::<T>(self.fixed_point, self.kv_len)
    }
}

/// Streaming SDPA kernel for operand kind `T`, validated at construction.
#[derive(Debug, Clone)]
pub struct StreamingSdpa<T> {
    config: SdpaConfig,
    _kind: PhantomData<T>,
}

impl<T: Element> StreamingSdpa<T> {
    pub fn new(config: SdpaConfig) -> Result<Self> {
        config.validate::<T>()?;

        tracing::debug!(
            "Streaming SDPA: kind={} query_len={} kv_len={} head_dim={} P={} frac_bits={} scale={}",
            T::KIND,
            config.query_len,
            config.kv_len,
            config.head_dim,
            config.rows_per_batch,
            config.fixed_point.frac_bits(),
            config.scale
        );

        Ok(Self {
            config,
            _kind: PhantomData,
        })
    }

    pub fn config(&self) -> &SdpaConfig {
        &self.config
    }

    /// Attention output `[query_len, head_dim]`.
    pub fn forward(&self, q: &Matrix<T>, k: &Matrix<T>, v: &Matrix<T>) -> Result<Matrix<T>> {
        self.check_operands(q, k, Some(v))?;

        let cfg = &self.config;
        let rows_per_batch = cfg.rows_per_batch;
        let batch_elems = rows_per_batch * cfg.head_dim;
        let mut out = Matrix::zeros(cfg.query_len, cfg.head_dim);

        let run_batch = |batch: &mut RowBatch<T::Acc>, index: usize, dst: &mut [T]| {
            batch.score_stage(q, k, index * rows_per_batch, cfg.scale);
            batch.softmax_stage();
            batch.quantize_stage(cfg.fixed_point);
            batch.accumulate_stage(v);
            batch.drain(cfg.fixed_point, dst);
        };

        match cfg.execution {
            ExecutionMode::Serial => {
                let mut batch = self.row_batch();
                for (index, dst) in out.as_mut_slice().chunks_mut(batch_elems).enumerate() {
                    run_batch(&mut batch, index, dst);
                }
            }
            ExecutionMode::Parallel => {
                LanePool::get().install(|| {
                    out.as_mut_slice()
                        .par_chunks_mut(batch_elems)
                        .enumerate()
                        .for_each_init(
                            || self.row_batch(),
                            |batch, (index, dst)| run_batch(batch, index, dst),
                        );
                });
            }
        }

        Ok(out)
    }

    /// Probability row for query row `row`, produced by the same staged code.
    pub fn attention_row(&self, q: &Matrix<T>, k: &Matrix<T>, row: usize) -> Result<Vec<f64>> {
        self.check_operands(q, k, None)?;
        if row >= self.config.query_len {
            return Err(KernelError::InvalidDimension {
                name: "row",
                reason: format!("{} is outside {} query rows", row, self.config.query_len),
            });
        }
        let mut batch = RowBatch::<T::Acc>::new(1, self.config.kv_len, self.config.head_dim);
        batch.score_stage(q, k, row, self.config.scale);
        batch.softmax_stage();
        Ok(batch.probabilities(0).to_vec())
    }

    /// Bytes of transient storage one batch of P rows holds.
    ///
    /// Besides the output matrix, `forward` allocates only row batches: one
    /// in serial mode and one per lane in parallel mode, reused across all
    /// batches the lane processes.
    pub fn transient_footprint(&self) -> usize {
        self.row_batch().footprint_bytes()
    }

    fn row_batch(&self) -> RowBatch<T::Acc> {
        #[cfg(test)]
        ROW_BATCHES_BUILT.with(|n| n.set(n.get() + 1));
        RowBatch::new(
            self.config.rows_per_batch,
            self.config.kv_len,
            self.config.head_dim,
        )
    }

    fn check_operands(&self, q: &Matrix<T>, k: &Matrix<T>, v: Option<&Matrix<T>>) -> Result<()> {
        let cfg = &self.config;
        q.expect_shape("query", cfg.query_len, cfg.head_dim)?;
        k.expect_shape("key", cfg.kv_len, cfg.head_dim)?;
        if let Some(v) = v {
            v.expect_shape("value", cfg.kv_len, cfg.head_dim)?;
        }
        Ok(())
    }
}

#[cfg(test)]
thread_local! {
    static ROW_BATCHES_BUILT: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// One-shot unbatched SDPA with shapes taken from the operands.
pub fn scaled_dot_product_attention<T: Element>(
    q: &Matrix<T>,
    k: &Matrix<T>,
    v: &Matrix<T>,
    scale: f64,
) -> Result<Matrix<T>> {
    let config = SdpaConfig::cross(q.rows(), k.rows(), q.cols()).with_scale(scale);
    StreamingSdpa::new(config)?.forward(q, k, v)
}
