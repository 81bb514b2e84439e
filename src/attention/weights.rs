//! Caller-owned projection weights
//!
//! Query and output projections belong to a query head; key and value
//! projections belong to a K/V head, which several query heads may share.
//! All projections are stored so they are applied with `multiply_transposed`:
//! - `w_q`: `[head_dim, model_dim]`
//! - `w_k`, `w_v`: `[head_dim, context_dim]`
//! - `w_o`: `[model_dim, head_dim]`

use crate::attention::config::AttentionConfig;
use crate::error::{KernelError, Result};
use crate::matrix::Matrix;
use crate::numeric::Element;

#[derive(Debug, Clone, PartialEq)]
pub struct HeadWeights<T> {
    pub w_q: Matrix<T>,
    pub w_o: Matrix<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KvWeights<T> {
    pub w_k: Matrix<T>,
    pub w_v: Matrix<T>,
}

/// One query head with everything it reads.
#[derive(Debug, Clone, Copy)]
pub struct HeadDescriptor<'a, T> {
    pub index: usize,
    pub kv_index: usize,
    pub w_q: &'a Matrix<T>,
    pub w_k: &'a Matrix<T>,
    pub w_v: &'a Matrix<T>,
    pub w_o: &'a Matrix<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttentionWeights<T> {
    pub heads: Vec<HeadWeights<T>>,
    pub kv: Vec<KvWeights<T>>,
}

impl<T: Element> AttentionWeights<T> {
    pub fn new(heads: Vec<HeadWeights<T>>, kv: Vec<KvWeights<T>>) -> Self {
        Self { heads, kv }
    }

    /// Fill every projection from `sample`, heads first, then K/V heads.
    pub fn generate(config: &AttentionConfig, mut sample: impl FnMut() -> T) -> Self {
        let (d_h, d_m, d_c) = (config.head_dim, config.model_dim, config.context_dim);
        let heads = (0..config.num_heads)
            .map(|_| HeadWeights {
                w_q: Matrix::from_fn(d_h, d_m, |_, _| sample()),
                w_o: Matrix::from_fn(d_m, d_h, |_, _| sample()),
            })
            .collect();
        let kv = (0..config.kv_heads())
            .map(|_| KvWeights {
                w_k: Matrix::from_fn(d_h, d_c, |_, _| sample()),
                w_v: Matrix::from_fn(d_h, d_c, |_, _| sample()),
            })
            .collect();
        Self { heads, kv }
    }

    pub fn head(&self, index: usize, config: &AttentionConfig) -> Result<HeadDescriptor<'_, T>> {
        config.head_policy.validate(config.num_heads)?;
        if index >= config.num_heads {
            return Err(KernelError::InvalidHeadPolicy {
                reason: format!("head {} is outside {} heads", index, config.num_heads),
            });
        }
        let kv_index = config.head_policy.kv_head_for(index, config.num_heads);
        let (Some(head), Some(kv)) = (self.heads.get(index), self.kv.get(kv_index)) else {
            return Err(KernelError::InvalidHeadPolicy {
                reason: format!(
                    "no weights for head {} (kv head {}) in {} heads / {} kv sets",
                    index,
                    kv_index,
                    self.heads.len(),
                    self.kv.len()
                ),
            });
        };
        Ok(HeadDescriptor {
            index,
            kv_index,
            w_q: &head.w_q,
            w_k: &kv.w_k,
            w_v: &kv.w_v,
            w_o: &head.w_o,
        })
    }

    pub fn validate(&self, config: &AttentionConfig) -> Result<()> {
        config.head_policy.validate(config.num_heads)?;
        if self.heads.len() != config.num_heads {
            return Err(KernelError::InvalidHeadPolicy {
                reason: format!(
                    "{} query head weight sets for {} heads",
                    self.heads.len(),
                    config.num_heads
                ),
            });
        }
        if self.kv.len() != config.kv_heads() {
            return Err(KernelError::InvalidHeadPolicy {
                reason: format!(
                    "{} kv weight sets for policy {}",
                    self.kv.len(),
                    config.head_policy
                ),
            });
        }
        let (d_h, d_m, d_c) = (config.head_dim, config.model_dim, config.context_dim);
        for head in &self.heads {
            head.w_q.expect_shape("w_q", d_h, d_m)?;
            head.w_o.expect_shape("w_o", d_m, d_h)?;
        }
        for kv in &self.kv {
            kv.w_k.expect_shape("w_k", d_h, d_c)?;
            kv.w_v.expect_shape("w_v", d_h, d_c)?;
        }
        Ok(())
    }
}
