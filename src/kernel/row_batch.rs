//! Staged row buffers for the streaming kernel
//!
//! A [`RowBatch`] owns the working set of P query rows: one score row of
//! `kv_len` entries per lane (reused in place for probabilities), the
//! fixed-point copy of those probabilities, and `head_dim` accumulators.
//! Nothing here ever scales with `kv_len²`.
//!
//! Stages run across all lanes before the next stage starts, and the inner
//! loops iterate lanes fastest, so each lane's accumulator chain has P - 1
//! independent operations between its dependent updates.

use std::mem::size_of;

use crate::kernel::matmul::dot;
use crate::kernel::quantize::FixedPoint;
use crate::kernel::softmax;
use crate::matrix::Matrix;
use crate::numeric::{Accumulator, Element};

struct RowLane<A> {
    scores: Vec<f64>,
    weights: Vec<A>,
    acc: Vec<A>,
    max: f64,
    sum: f64,
}

impl<A: Accumulator> RowLane<A> {
    fn new(kv_len: usize, head_dim: usize) -> Self {
        Self {
            scores: vec![0.0; kv_len],
            weights: vec![A::default(); kv_len],
            acc: vec![A::default(); head_dim],
            max: f64::NEG_INFINITY,
            sum: 0.0,
        }
    }

    fn footprint_bytes(&self) -> usize {
        self.scores.len() * size_of::<f64>()
            + (self.weights.len() + self.acc.len()) * size_of::<A>()
            + 2 * size_of::<f64>()
    }
}

pub struct RowBatch<A> {
    lanes: Vec<RowLane<A>>,
    head_dim: usize,
}

impl<A: Accumulator> RowBatch<A> {
    pub fn new(width: usize, kv_len: usize, head_dim: usize) -> Self {
        Self {
            lanes: (0..width).map(|_| RowLane::new(kv_len, head_dim)).collect(),
            head_dim,
        }
    }

    /// Bytes held by the lane buffers of this batch.
    pub fn footprint_bytes(&self) -> usize {
        self.lanes.iter().map(RowLane::footprint_bytes).sum()
    }

    /// Stage 1: raw scores of query rows `first_row..first_row + P` against
    /// every key row, divided by `scale`, tracking each row's maximum.
    pub fn score_stage<T>(&mut self, q: &Matrix<T>, k: &Matrix<T>, first_row: usize, scale: f64)
    where
        T: Element<Acc = A>,
    {
        for lane in self.lanes.iter_mut() {
            lane.max = f64::NEG_INFINITY;
        }
        for j in 0..k.rows() {
            let key = k.row(j);
            for (p, lane) in self.lanes.iter_mut().enumerate() {
                let s = dot(q.row(first_row + p), key).to_f64() / scale;
                lane.scores[j] = s;
                if s > lane.max {
                    lane.max = s;
                }
            }
        }
    }

    /// Stage 2: exponentiate against the row maximum, sum, normalise.
    ///
    /// Needs the complete score row of every lane.
    pub fn softmax_stage(&mut self) {
        for lane in self.lanes.iter_mut() {
            lane.sum = softmax::exponentiate(&mut lane.scores, lane.max);
        }
        for lane in self.lanes.iter_mut() {
            softmax::normalize(&mut lane.scores, lane.sum);
        }
    }

    /// Stage 3: convert probabilities to accumulator weights.
    pub fn quantize_stage(&mut self, fixed: FixedPoint) {
        for lane in self.lanes.iter_mut() {
            for (w, &p) in lane.weights.iter_mut().zip(&lane.scores) {
                *w = A::probability_weight(p, fixed);
            }
        }
    }

    /// Stage 4: value-weighted sum into the lane accumulators.
    pub fn accumulate_stage<T>(&mut self, v: &Matrix<T>)
    where
        T: Element<Acc = A>,
    {
        for lane in self.lanes.iter_mut() {
            lane.acc.fill(A::default());
        }
        for j in 0..v.rows() {
            let value = v.row(j);
            for lane in self.lanes.iter_mut() {
                let w = lane.weights[j];
                for (slot, &x) in lane.acc.iter_mut().zip(value) {
                    *slot += w * x.widen();
                }
            }
        }
    }

    /// Rescale each accumulator once, narrow, and write P output rows.
    pub fn drain<T>(&self, fixed: FixedPoint, out: &mut [T])
    where
        T: Element<Acc = A>,
    {
        for (lane, dst) in self.lanes.iter().zip(out.chunks_mut(self.head_dim)) {
            for (o, &a) in dst.iter_mut().zip(&lane.acc) {
                *o = T::narrow(a.rescale(fixed));
            }
        }
    }

    /// Probability row of lane `p` after the softmax stage.
    pub fn probabilities(&self, p: usize) -> &[f64] {
        &self.lanes[p].scores
    }
}
