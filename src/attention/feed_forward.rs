//! Boundary between attention and the feed-forward block that consumes it.
//!
//! Only the contract lives here: the attention output handed to a
//! feed-forward stage is `[seq_len, model_dim]`, and the parameters it owns
//! have the shapes described by [`FeedForwardShape`].

use serde::{Deserialize, Serialize};

use crate::attention::config::AttentionConfig;
use crate::error::{KernelError, Result};
use crate::matrix::Matrix;
use crate::numeric::Element;

/// Stage that consumes attention output.
pub trait FeedForward<T: Element> {
    fn forward(&self, attention_out: &Matrix<T>) -> Result<Matrix<T>>;
}

impl<T, F> FeedForward<T> for F
where
    T: Element,
    F: Fn(&Matrix<T>) -> Result<Matrix<T>>,
{
    fn forward(&self, attention_out: &Matrix<T>) -> Result<Matrix<T>> {
        self(attention_out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedForwardShape {
    pub seq_len: usize,
    pub model_dim: usize,
    pub hidden_dim: usize,
}

/// Expansion and contraction weights (applied transposed), their biases and
/// the normalisation scale and shift.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardParams<T> {
    /// `[hidden_dim, model_dim]`
    pub w_expand: Matrix<T>,
    pub b_expand: Vec<T>,
    /// `[model_dim, hidden_dim]`
    pub w_contract: Matrix<T>,
    pub b_contract: Vec<T>,
    pub gamma: Vec<T>,
    pub beta: Vec<T>,
}

impl FeedForwardShape {
    pub fn new(seq_len: usize, model_dim: usize, hidden_dim: usize) -> Self {
        Self {
            seq_len,
            model_dim,
            hidden_dim,
        }
    }

    /// Shape fed by an attention block, with the usual 4x expansion when
    /// `hidden_dim` is not given.
    pub fn for_attention(config: &AttentionConfig, hidden_dim: Option<usize>) -> Self {
        Self::new(
            config.seq_len,
            config.model_dim,
            hidden_dim.unwrap_or(4 * config.model_dim),
        )
    }

    pub fn validate_input<T: Element>(&self, attention_out: &Matrix<T>) -> Result<()> {
        attention_out.expect_shape("attention output", self.seq_len, self.model_dim)
    }

    pub fn validate_params<T: Element>(&self, params: &FeedForwardParams<T>) -> Result<()> {
        if self.hidden_dim == 0 {
            return Err(KernelError::zero_dim("hidden_dim"));
        }
        params
            .w_expand
            .expect_shape("w_expand", self.hidden_dim, self.model_dim)?;
        params
            .w_contract
            .expect_shape("w_contract", self.model_dim, self.hidden_dim)?;
        for (name, vector, len) in [
            ("b_expand", &params.b_expand, self.hidden_dim),
            ("b_contract", &params.b_contract, self.model_dim),
            ("gamma", &params.gamma, self.model_dim),
            ("beta", &params.beta, self.model_dim),
        ] {
            if vector.len() != len {
                return Err(KernelError::InvalidDimension {
                    name,
                    reason: format!("expected {} entries, got {}", len, vector.len()),
                });
            }
        }
        Ok(())
    }
}
