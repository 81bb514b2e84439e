//! Float64 attention reference on candle
//!
//! Textbook `softmax(Q · Kᵗ / scale) · V` and the per-head
//! concatenate-then-project pipeline, built from candle ops only, so it shares
//! no code with the streaming kernel or the orchestrator. Used by the CLI
//! reports and the integration tests.

use candle_core::{Device, Tensor, D};

use crate::attention::{AttentionConfig, AttentionWeights};
use crate::error::Result;
use crate::matrix::Matrix;
use crate::numeric::Element;

fn tensor<T: Element>(m: &Matrix<T>) -> Result<Tensor> {
    m.to_f64().to_tensor(&Device::Cpu)
}

fn transposed<T: Element>(m: &Matrix<T>) -> Result<Tensor> {
    Ok(tensor(m)?.t()?.contiguous()?)
}

/// `softmax(Q · Kᵗ / scale)` as a `[query_len, kv_len]` f64 tensor.
pub fn probabilities<T: Element>(q: &Matrix<T>, k: &Matrix<T>, scale: f64) -> Result<Tensor> {
    let scores = (tensor(q)?.matmul(&transposed(k)?)? / scale)?;
    Ok(candle_nn::ops::softmax(&scores, D::Minus1)?)
}

pub fn attention<T: Element>(
    q: &Matrix<T>,
    k: &Matrix<T>,
    v: &Matrix<T>,
    scale: f64,
) -> Result<Matrix<f64>> {
    let out = probabilities(q, k, scale)?.matmul(&tensor(v)?)?;
    Matrix::from_tensor(&out)
}

/// Per-head projections and attention, concatenated along columns and
/// projected by the stacked output weights.
pub fn multi_head<T: Element>(
    config: &AttentionConfig,
    x: &Matrix<T>,
    context: &Matrix<T>,
    weights: &AttentionWeights<T>,
) -> Result<Matrix<f64>> {
    let project = |input: &Matrix<T>, w: &Matrix<T>| -> Result<Matrix<f64>> {
        Matrix::from_tensor(&tensor(input)?.matmul(&transposed(w)?)?)
    };

    let mut heads = Vec::with_capacity(config.num_heads);
    let mut w_o = Vec::with_capacity(config.num_heads);
    for h in 0..config.num_heads {
        let head = weights.head(h, config)?;
        let q = project(x, head.w_q)?;
        let k = project(context, head.w_k)?;
        let v = project(context, head.w_v)?;
        heads.push(tensor(&attention(&q, &k, &v, config.scale())?)?);
        w_o.push(tensor(head.w_o)?);
    }
    let concat = Tensor::cat(&heads, 1)?;
    let w_o = Tensor::cat(&w_o, 1)?.t()?.contiguous()?;
    Matrix::from_tensor(&concat.matmul(&w_o)?)
}

/// Pearson correlation, 0.0 when either side is constant.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

/// `max |a - b| / max |b|`, or the absolute difference when `b` is all zero.
pub fn normwise_error(a: &Matrix<f64>, b: &Matrix<f64>) -> f64 {
    let diff = a
        .as_slice()
        .iter()
        .zip(b.as_slice())
        .fold(0.0f64, |m, (x, y)| m.max((x - y).abs()));
    let scale = b.as_slice().iter().fold(0.0f64, |m, y| m.max(y.abs()));
    if scale > 0.0 {
        diff / scale
    } else {
        diff
    }
}
